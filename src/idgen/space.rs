use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::RecordAccess;
use crate::types::{PenumbraError, Result, StoreKind};

use super::header::{read_free_ids, read_header, write_free_ids, write_header, IdFileHeader};

/// Ids reserved on disk each time allocation passes the persisted high id.
pub const DEFAULT_HIGH_ID_RESERVE: u64 = 1_024;

/// Options applied when opening an identifier file.
#[derive(Clone, Copy, Debug)]
pub struct IdOpenOptions {
    /// High id reported by the record store itself; wins over the persisted
    /// value when larger.
    pub store_high_id: Option<u64>,
    /// Open without writing the sticky marker. Mutations are rejected.
    pub read_only: bool,
    /// How far past the allocated ids the on-disk high id is pushed while the
    /// space is open. A crash abandons at most this many ids.
    pub high_id_reserve: u64,
}

impl Default for IdOpenOptions {
    fn default() -> Self {
        Self {
            store_high_id: None,
            read_only: false,
            high_id_reserve: DEFAULT_HIGH_ID_RESERVE,
        }
    }
}

impl IdOpenOptions {
    /// Sets the record store's own high id.
    pub fn store_high_id(mut self, high_id: u64) -> Self {
        self.store_high_id = Some(high_id);
        self
    }

    /// Opens the space for inspection only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the number of ids reserved on disk ahead of allocation.
    pub fn high_id_reserve(mut self, reserve: u64) -> Self {
        self.high_id_reserve = reserve;
        self
    }
}

/// Allocation and free-list state for one fixed-slot record store.
///
/// Owned by exactly one writer. Dropping the space without [`close`] leaves
/// the sticky marker set on disk, which the next [`open`] treats as an
/// unclean shutdown.
///
/// While open, the high id on disk never trails an id handed out by
/// [`next_id`](IdentifierSpace::next_id), so recovery after a crash resumes
/// above every id the crashed session allocated.
///
/// [`close`]: IdentifierSpace::close
/// [`open`]: IdentifierSpace::open
pub struct IdentifierSpace {
    io: Arc<dyn FileIo>,
    high_id: u64,
    /// High id currently recorded in the sticky header.
    reserved_high: u64,
    reserve: u64,
    free_ids: BTreeSet<u64>,
    store_ok: bool,
    read_only: bool,
}

impl IdentifierSpace {
    /// Creates a clean identifier file with an empty free list.
    pub fn create(path: impl AsRef<Path>, high_id: u64) -> Result<()> {
        let io = StdFileIo::create_new(path.as_ref())?;
        write_header(
            &io,
            &IdFileHeader {
                sticky: false,
                high_id,
                free_count: 0,
            },
        )?;
        debug!(path = %path.as_ref().display(), high_id, "idgen.create");
        Ok(())
    }

    /// Opens an existing identifier file.
    pub fn open(path: impl AsRef<Path>, opts: IdOpenOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PenumbraError::NotFound("identifier file"));
        }
        let io: Arc<dyn FileIo> = if opts.read_only {
            Arc::new(StdFileIo::open_read_only(path)?)
        } else {
            Arc::new(StdFileIo::open(path)?)
        };
        Self::open_with_io(io, opts)
    }

    /// Opens an identifier space over an arbitrary file backend.
    pub fn open_with_io(io: Arc<dyn FileIo>, opts: IdOpenOptions) -> Result<Self> {
        let header = read_header(io.as_ref())?;
        let high_id = header.high_id.max(opts.store_high_id.unwrap_or(0));
        // The marker must be consulted before a single free id is trusted.
        let (free_ids, store_ok) = if header.sticky {
            warn!(
                high_id,
                discarded = header.free_count,
                "idgen.open.unclean"
            );
            (BTreeSet::new(), false)
        } else {
            (read_free_ids(io.as_ref(), &header)?, true)
        };
        let space = Self {
            io,
            high_id,
            reserved_high: header.high_id,
            reserve: opts.high_id_reserve.max(1),
            free_ids,
            store_ok,
            read_only: opts.read_only,
        };
        if !space.read_only {
            write_header(
                space.io.as_ref(),
                &IdFileHeader {
                    sticky: true,
                    ..header
                },
            )?;
        }
        info!(
            high_id = space.high_id,
            free = space.free_ids.len(),
            store_ok = space.store_ok,
            read_only = space.read_only,
            "idgen.open"
        );
        Ok(space)
    }

    /// Returns false when the previous session ended uncleanly and the free
    /// list has not been re-established since.
    pub fn store_ok(&self) -> bool {
        self.store_ok
    }

    /// Exclusive upper bound of ever-allocated ids.
    pub fn high_id(&self) -> u64 {
        self.high_id
    }

    /// Number of ids currently eligible for reuse.
    pub fn free_count(&self) -> usize {
        self.free_ids.len()
    }

    /// Returns whether `id` is on the free list.
    pub fn is_free(&self, id: u64) -> bool {
        self.free_ids.contains(&id)
    }

    /// Hands out an id: the lowest free id when the free list is trusted,
    /// otherwise the current high id.
    pub fn next_id(&mut self) -> Result<u64> {
        self.ensure_writable()?;
        if self.store_ok {
            if let Some(id) = self.free_ids.pop_first() {
                return Ok(id);
            }
        }
        let id = self.high_id;
        let next = id
            .checked_add(1)
            .ok_or(PenumbraError::Invalid("identifier space exhausted"))?;
        if next > self.reserved_high {
            self.reserve_through(next)?;
        }
        self.high_id = next;
        Ok(id)
    }

    /// Marks `id` reusable.
    pub fn free_id(&mut self, id: u64) -> Result<()> {
        self.ensure_writable()?;
        if id >= self.high_id {
            return Err(PenumbraError::Invalid("freed id at or beyond high id"));
        }
        if !self.free_ids.insert(id) {
            return Err(PenumbraError::Invalid("id is already free"));
        }
        Ok(())
    }

    /// Moves the high id. Lowering it below a free id is rejected.
    pub fn set_high_id(&mut self, high_id: u64) -> Result<()> {
        self.ensure_writable()?;
        if let Some(&max_free) = self.free_ids.last() {
            if max_free >= high_id {
                return Err(PenumbraError::Invalid("high id below a free id"));
            }
        }
        self.high_id = high_id;
        Ok(())
    }

    /// Discards all persisted and in-memory free-list state, keeping the high id.
    pub fn delete_id_generator(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let discarded = self.free_ids.len();
        self.free_ids.clear();
        write_header(self.io.as_ref(), &self.header(true))?;
        write_free_ids(self.io.as_ref(), &self.free_ids)?;
        self.io.sync_all()?;
        info!(high_id = self.high_id, discarded, "idgen.delete");
        Ok(())
    }

    /// Commits to the current high id and free list as trustworthy.
    pub fn make_store_ok(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.store_ok = true;
        self.persist(true)?;
        info!(
            high_id = self.high_id,
            free = self.free_ids.len(),
            "idgen.store_ok"
        );
        Ok(())
    }

    /// Rebuilds the free list from the record store's in-use flags.
    ///
    /// Every slot below the high id that the store reports as not in use
    /// becomes free. Marks the space ok on success and returns the number of
    /// free ids found.
    pub fn rebuild_free_ids(&mut self, store: &dyn RecordAccess, kind: StoreKind) -> Result<u64> {
        self.ensure_writable()?;
        let high_id = self.high_id.max(store.high_id(kind));
        let mut free_ids = BTreeSet::new();
        for id in 0..high_id {
            if !store.is_in_use(kind, id)? {
                free_ids.insert(id);
            }
        }
        let found = free_ids.len() as u64;
        self.high_id = high_id;
        self.free_ids = free_ids;
        self.store_ok = true;
        self.persist(true)?;
        info!(store = %kind, high_id, free = found, "idgen.rebuild");
        Ok(found)
    }

    /// Persists state and clears the sticky marker.
    ///
    /// The state is synced before the marker is cleared, so a crash between
    /// the two leaves the marker set.
    pub fn close(self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.persist(true)?;
        write_header(self.io.as_ref(), &self.header(false))?;
        info!(
            high_id = self.high_id,
            free = self.free_ids.len(),
            "idgen.close"
        );
        Ok(())
    }

    fn header(&self, sticky: bool) -> IdFileHeader {
        let high_id = if sticky {
            self.high_id.max(self.reserved_high)
        } else {
            self.high_id
        };
        IdFileHeader {
            sticky,
            high_id,
            free_count: self.free_ids.len() as u64,
        }
    }

    /// Pushes the on-disk high id to at least `high_id` plus the reserve.
    /// The free list on disk is left as it is.
    fn reserve_through(&mut self, high_id: u64) -> Result<()> {
        let reserved = high_id.saturating_add(self.reserve);
        let mut header = read_header(self.io.as_ref())?;
        header.sticky = true;
        header.high_id = reserved;
        write_header(self.io.as_ref(), &header)?;
        debug!(high_id, reserved, "idgen.reserve");
        self.reserved_high = reserved;
        Ok(())
    }

    fn persist(&self, sticky: bool) -> Result<()> {
        write_free_ids(self.io.as_ref(), &self.free_ids)?;
        write_header(self.io.as_ref(), &self.header(sticky))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(PenumbraError::Invalid("identifier space opened read-only"));
        }
        Ok(())
    }
}
