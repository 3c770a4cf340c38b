//! Runtime state - one embedded interpreter and its host-side bookkeeping
//!
//! Everything that must live exactly as long as the interpreter hangs off
//! `RuntimeState`: the root set, the dispatch table, the error protector.
//! Handles share it through `Rc`, so the interpreter is closed only after the
//! last handle is gone.

use core::ptr::NonNull;
use std::cell::Cell;
use std::ffi::c_int;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::ffi::{ptr_to_nonnull, sys};
use crate::gc::Roots;
use crate::interop::{DispatchTable, ErrorHandler, MarshalMode, Protector, Stack, Status};
use crate::logging::{log_state_close, log_state_open};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Options fixed when a runtime is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateOptions {
    /// Load the standard libraries into the fresh state
    pub open_libs: bool,
    /// Initial marshal mode for values read back from the runtime
    pub marshal_mode: MarshalMode,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            open_libs: true,
            marshal_mode: MarshalMode::default(),
        }
    }
}

/// Owner of one interpreter instance
pub struct RuntimeState {
    raw: NonNull<sys::lua_State>,
    id: u64,
    roots: Roots,
    dispatch: DispatchTable,
    protector: Protector,
    marshal_mode: Cell<MarshalMode>,
}

impl RuntimeState {
    /// Create a fresh interpreter
    pub fn open(options: StateOptions, handler: Option<ErrorHandler>) -> Result<Rc<Self>> {
        let raw = ptr_to_nonnull(unsafe { sys::luaL_newstate() }).ok_or(Error::StateCreation)?;
        if options.open_libs {
            unsafe { sys::luaL_openlibs(raw.as_ptr()) };
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        log_state_open(id, options.open_libs);

        Ok(Rc::new(Self {
            raw,
            id,
            roots: Roots::new(),
            dispatch: DispatchTable::new(),
            protector: Protector::new(handler),
            marshal_mode: Cell::new(options.marshal_mode),
        }))
    }

    /// Stack view of the main thread
    #[inline]
    pub fn stack(self: &Rc<Self>) -> Stack<'_> {
        // Safety: `raw` stays open until this state drops.
        unsafe { Stack::from_raw(self.raw, self) }
    }

    /// Process-unique identifier, used to tell runtimes apart
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    #[inline]
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    #[inline]
    pub fn protector(&self) -> &Protector {
        &self.protector
    }

    #[inline]
    pub fn marshal_mode(&self) -> MarshalMode {
        self.marshal_mode.get()
    }

    pub fn set_marshal_mode(&self, mode: MarshalMode) {
        self.marshal_mode.set(mode);
    }

    /// Run the protector over a status code
    #[inline]
    pub fn protect(self: &Rc<Self>, status: c_int) -> Result<()> {
        self.protector.protect(self.stack(), status)
    }

    /// Protect `status` and report whether the operation succeeded.
    ///
    /// `Ok(false)` means the runtime failed but the handler absorbed it.
    pub fn check(self: &Rc<Self>, status: c_int) -> Result<bool> {
        let ok = Status::from_code(status).is_ok();
        self.protect(status)?;
        Ok(ok)
    }
}

impl Drop for RuntimeState {
    fn drop(&mut self) {
        log_state_close(self.id, self.dispatch.len());
        unsafe { sys::lua_close(self.raw.as_ptr()) };
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("id", &self.id)
            .field("live_references", &self.roots.live_count())
            .field("dispatch", &self.dispatch)
            .field("protector", &self.protector)
            .field("marshal_mode", &self.marshal_mode.get())
            .finish()
    }
}
