//! Process-wide SMEM slot.

use crate::{
    config::{Config, Platform},
    smem_dbg, smem_err,
    sync::{Clock, HwSpinlock, RwLock},
    Error, Smem,
};
use core::ptr::NonNull;

/// Holder of the single SMEM engine of a process.
///
/// Clients call into the cell and get [`Error::NotReady`] until the engine is
/// probed, so they can defer their own bring-up. The cell never blocks: while
/// a probe or a teardown is in progress every call fails with
/// [`Error::NotReady`] as well.
///
/// # Examples
///
/// ```
/// use drone_smem::{SmemCell, SoftSpinlock, StdClock};
///
/// static SMEM: SmemCell<SoftSpinlock, StdClock> = SmemCell::new();
///
/// assert_eq!(SMEM.get(None, 9).err(), Some(drone_smem::Error::NotReady));
/// assert_eq!(SMEM.virt_to_phys(core::ptr::null()), 0);
/// ```
pub struct SmemCell<L: HwSpinlock, C: Clock> {
    state: RwLock<State<L, C>>,
}

enum State<L: HwSpinlock, C: Clock> {
    Empty,
    Ready(Smem<L, C>),
    Frozen(Config),
}

impl<L: HwSpinlock, C: Clock> SmemCell<L, C> {
    maybe_const_fn! {
        /// Creates an empty cell.
        #[inline]
        pub const fn new() -> Self {
            Self { state: RwLock::new(State::Empty) }
        }
    }

    /// Probes SMEM and installs the engine.
    ///
    /// Fails with [`Error::Busy`] if an engine is already installed.
    pub fn probe<P>(&self, config: &Config, platform: &mut P) -> Result<(), Error>
    where
        P: Platform<Lock = L, Clock = C>,
    {
        let mut state = self.state.try_write().ok_or(Error::NotReady)?;
        if let State::Ready(_) = *state {
            return Err(Error::Busy);
        }
        *state = State::Ready(Smem::probe(config, platform)?);
        Ok(())
    }

    /// Uninstalls the engine, releasing the hardware mutex.
    pub fn remove(&self) -> Result<(), Error> {
        let mut state = self.state.try_write().ok_or(Error::NotReady)?;
        match core::mem::replace(&mut *state, State::Empty) {
            State::Ready(_) | State::Frozen(_) => Ok(()),
            State::Empty => Err(Error::NotReady),
        }
    }

    /// Tears the engine down before hibernation, keeping its configuration
    /// for [`restore`](SmemCell::restore).
    pub fn freeze(&self) -> Result<(), Error> {
        let mut state = self.state.try_write().ok_or(Error::NotReady)?;
        match core::mem::replace(&mut *state, State::Empty) {
            State::Ready(smem) => {
                smem_dbg!("freeze");
                *state = State::Frozen(smem.remove());
                Ok(())
            }
            other => {
                *state = other;
                Err(Error::NotReady)
            }
        }
    }

    /// Probes SMEM again after hibernation.
    ///
    /// Nothing of the frozen engine survives, the region is parsed from
    /// scratch. On failure the cell stays frozen and the restore may be
    /// retried.
    pub fn restore<P>(&self, platform: &mut P) -> Result<(), Error>
    where
        P: Platform<Lock = L, Clock = C>,
    {
        let mut state = self.state.try_write().ok_or(Error::NotReady)?;
        let config = match *state {
            State::Frozen(config) => config,
            State::Ready(_) => return Err(Error::Busy),
            State::Empty => return Err(Error::NotReady),
        };
        smem_dbg!("restore");
        match Smem::probe(&config, platform) {
            Ok(smem) => {
                *state = State::Ready(smem);
                Ok(())
            }
            Err(err) => {
                smem_err!("error getting SMEM information: {}", err);
                Err(err)
            }
        }
    }

    /// Runs `f` on the installed engine.
    pub fn with<R>(&self, f: impl FnOnce(&Smem<L, C>) -> R) -> Result<R, Error> {
        let state = self.state.try_read().ok_or(Error::NotReady)?;
        match &*state {
            State::Ready(smem) => Ok(f(smem)),
            State::Empty | State::Frozen(_) => Err(Error::NotReady),
        }
    }

    /// Returns `true` if an engine is installed.
    pub fn is_ready(&self) -> bool {
        self.with(|_| ()).is_ok()
    }

    /// See [`Smem::alloc`].
    pub fn alloc(&self, host: Option<u16>, item: u32, size: usize) -> Result<(), Error> {
        self.with(|smem| smem.alloc(host, item, size))?
    }

    /// See [`Smem::get`].
    pub fn get(&self, host: Option<u16>, item: u32) -> Result<NonNull<[u8]>, Error> {
        self.with(|smem| smem.get(host, item))?
    }

    /// See [`Smem::free_space`].
    pub fn free_space(&self, host: Option<u16>) -> Result<usize, Error> {
        self.with(|smem| smem.free_space(host))?
    }

    /// See [`Smem::virt_to_phys`]. Returns 0 if no engine is installed.
    pub fn virt_to_phys(&self, ptr: *const u8) -> u64 {
        self.with(|smem| smem.virt_to_phys(ptr)).unwrap_or(0)
    }
}

impl<L: HwSpinlock, C: Clock> Default for SmemCell<L, C> {
    fn default() -> Self {
        Self::new()
    }
}
