//! Session facade - one embedded runtime and everything done with it
//!
//! A `Session` owns its runtime through a shared handle; clones of the
//! session, references and table views all keep it open. When the last
//! session clone goes, every registered host function is released, so
//! handles captured by those functions cannot keep the runtime alive. All
//! access is single-threaded (`Session` is neither `Send` nor `Sync`), and
//! host functions called from scripts may drive the same session
//! re-entrantly through a `WeakSession`.

mod global;

pub use global::Global;

use std::ffi::c_int;
use std::io::Read;
use std::rc::{Rc, Weak};

use moonbridge_runtime::ffi::{push_field, store_field, sys};
use moonbridge_runtime::interop::{
    self, create_function, install, load_reader, load_source, marshal, wrap, ErrorHandler, HostFunction,
    IntoArgs, MarshalMode, Params, ToStack, EVAL_CHUNK,
};
use moonbridge_runtime::logging::{debug, perf};
use moonbridge_runtime::{gc, Error, Reference, Result, RuntimeState, StateOptions, Table, Variant};

use crate::frontend::config::Config;

/// Handle to one embedded runtime
#[derive(Clone)]
pub struct Session {
    runtime: Rc<RuntimeState>,
    owner: Rc<Owner>,
}

/// Shared by every clone of one session; releases host functions on drop
struct Owner {
    runtime: Rc<RuntimeState>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        let released = self.runtime.dispatch_table().release_all();
        debug!(
            event = "session_close",
            runtime = self.runtime.id(),
            released,
            "session closed"
        );
    }
}

/// Non-owning session handle for host functions that call back into the
/// session that registered them. Capturing a `Session` in a registered
/// closure would keep the session open forever.
#[derive(Clone)]
pub struct WeakSession {
    owner: Weak<Owner>,
}

impl WeakSession {
    /// The session, if it has not been torn down
    pub fn upgrade(&self) -> Option<Session> {
        self.owner.upgrade().map(|owner| Session {
            runtime: Rc::clone(&owner.runtime),
            owner,
        })
    }
}

impl Session {
    /// Open a runtime with the standard libraries and a fail-closed handler
    pub fn new() -> Result<Self> {
        Self::with_options(StateOptions::default(), Some(interop::fail_closed()))
    }

    /// Open a runtime whose failures go to `handler`
    pub fn with_handler(handler: ErrorHandler) -> Result<Self> {
        Self::with_options(StateOptions::default(), Some(handler))
    }

    /// Open a runtime as described by the `[session]` section of `config`
    pub fn with_config(config: &Config) -> Result<Self> {
        Self::with_options(config.session.state_options(), config.session.error_mode.handler())
    }

    /// Open a runtime with explicit options.
    ///
    /// With no handler, runtime failures are absorbed and operations that
    /// produce a value yield Nil.
    pub fn with_options(options: StateOptions, handler: Option<ErrorHandler>) -> Result<Self> {
        let runtime = RuntimeState::open(options, handler)?;
        let owner = Rc::new(Owner {
            runtime: Rc::clone(&runtime),
        });
        Ok(Self { runtime, owner })
    }

    /// Underlying runtime state
    #[inline]
    pub fn runtime(&self) -> &Rc<RuntimeState> {
        &self.runtime
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            owner: Rc::downgrade(&self.owner),
        }
    }

    /// Replace the error handler, returning the previous one
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
        self.runtime.protector().set_handler(handler)
    }

    pub fn marshal_mode(&self) -> MarshalMode {
        self.runtime.marshal_mode()
    }

    pub fn set_marshal_mode(&self, mode: MarshalMode) {
        self.runtime.set_marshal_mode(mode);
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Assign the global `name`
    pub fn set_global(&self, name: &str, value: impl Into<Variant>) -> Result<()> {
        let key = global_key(name)?;
        let value = value.into();
        let stack = self.runtime.stack();
        let _guard = stack.guard();
        store_field(stack, |s| s.push_globals(), &key, &value)
    }

    /// Read the global `name` under the session's marshal mode
    pub fn get_global(&self, name: &str) -> Result<Variant> {
        let key = global_key(name)?;
        let stack = self.runtime.stack();
        let _guard = stack.guard();
        if !push_field(stack, |s| s.push_globals(), &key)? {
            return Ok(Variant::Nil);
        }
        marshal::pop_with(stack, self.runtime.marshal_mode())
    }

    /// Claim the object held by the global `name`, if it is not nil
    pub fn get_reference(&self, name: &str) -> Result<Option<Reference>> {
        let key = global_key(name)?;
        let stack = self.runtime.stack();
        let _guard = stack.guard();
        if !push_field(stack, |s| s.push_globals(), &key)? {
            return Ok(None);
        }
        let reference = if stack.type_of(-1).is_nil_or_none() {
            Ok(None)
        } else {
            Reference::acquire(stack, -1).map(Some)
        };
        stack.pop(1);
        reference
    }

    /// Table view of the global `name`.
    ///
    /// A global holding something other than a table is a marshal error.
    pub fn get_table(&self, name: &str) -> Result<Option<Table>> {
        self.get_reference(name)?.map(Table::from_reference).transpose()
    }

    /// Proxy for one global name
    pub fn global(&self, name: impl Into<String>) -> Global<'_> {
        Global::new(self, name.into())
    }

    /// Allocate an empty table owned by this runtime
    pub fn create_table(&self) -> Result<Table> {
        Table::new(self.runtime.stack())
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Run a chunk of source text
    pub fn eval(&self, source: &str) -> Result<()> {
        self.eval_chunk(source, EVAL_CHUNK)
    }

    /// Run source text under an explicit chunk name (`@file` or `=label`)
    pub fn eval_chunk(&self, source: &str, chunk_name: &str) -> Result<()> {
        let _perf = perf::track("eval");
        let stack = self.runtime.stack();
        let _guard = stack.guard();

        let status = load_source(stack, source, chunk_name)?;
        self.run_loaded(status)
    }

    /// Run a chunk streamed from `reader`
    pub fn eval_reader(&self, mut reader: impl Read, chunk_name: &str) -> Result<()> {
        let _perf = perf::track("eval_reader");
        let stack = self.runtime.stack();
        let _guard = stack.guard();

        let status = load_reader(stack, &mut reader, chunk_name)?;
        self.run_loaded(status)
    }

    /// Protect a load status and, if it succeeded, call the loaded chunk
    fn run_loaded(&self, status: c_int) -> Result<()> {
        if !self.runtime.check(status)? {
            return Ok(());
        }
        let stack = self.runtime.stack();
        let status = unsafe { sys::lua_pcall(stack.as_ptr(), 0, 0, 0) };
        self.runtime.protect(status)
    }

    /// Call the global function `name` with `args`, expecting one result.
    ///
    /// Arguments are pushed left to right. A failure absorbed by the error
    /// handler yields Nil.
    pub fn call(&self, name: &str, args: impl IntoArgs) -> Result<Variant> {
        let key = global_key(name)?;
        let _perf = perf::track("call");
        let stack = self.runtime.stack();
        let _guard = stack.guard();

        if !push_field(stack, |s| s.push_globals(), &key)? {
            return Ok(Variant::Nil);
        }
        self.call_pushed(name, args.into_args())
    }

    /// Call a referenced function with `args`, expecting one result
    pub fn call_reference(&self, function: &Reference, args: impl IntoArgs) -> Result<Variant> {
        let _perf = perf::track("call");
        let stack = self.runtime.stack();
        let _guard = stack.guard();

        stack.reserve(1)?;
        function.push(stack);
        self.call_pushed("<reference>", args.into_args())
    }

    /// The callee is on top of the stack; consumes it.
    fn call_pushed(&self, name: &str, args: Vec<Variant>) -> Result<Variant> {
        let stack = self.runtime.stack();
        let room = c_int::try_from(args.len())
            .map_err(|_| Error::StackOverflow { requested: args.len() })
            .and_then(|nargs| stack.reserve(args.len() + 1).map(|()| nargs));
        let nargs = match room {
            Ok(nargs) => nargs,
            Err(err) => {
                stack.pop(1);
                return Err(err);
            }
        };
        for arg in &args {
            marshal::push(stack, arg);
        }

        debug!(event = "call", function = name, args = nargs, "calling runtime function");
        let status = unsafe { sys::lua_pcall(stack.as_ptr(), nargs, 1, 0) };
        if !self.runtime.check(status)? {
            return Ok(Variant::Nil);
        }
        marshal::pop_with(stack, self.runtime.marshal_mode())
    }

    // ------------------------------------------------------------------
    // Host functions
    // ------------------------------------------------------------------

    /// Expose `func` to scripts as the global function `name`.
    ///
    /// `func` may capture tables and references from this session. It is
    /// released together with them once the last session clone drops, after
    /// which scripts calling it get a runtime error.
    pub fn register<F, P, R>(&self, name: &str, func: F) -> Result<()>
    where
        F: HostFunction<P, R>,
        P: Params,
        R: ToStack + 'static,
    {
        install(&self.runtime, name, Box::new(wrap(name, func)))
    }

    /// Wrap `func` as an anonymous runtime function.
    ///
    /// Released with the session, like [`Session::register`].
    pub fn create_function<F, P, R>(&self, name: &str, func: F) -> Result<Reference>
    where
        F: HostFunction<P, R>,
        P: Params,
        R: ToStack + 'static,
    {
        create_function(&self.runtime, Box::new(wrap(name, func)))
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Current depth of the main thread's stack; zero between operations
    pub fn stack_depth(&self) -> usize {
        usize::try_from(self.runtime.stack().top()).unwrap_or(0)
    }

    /// References currently holding a registry anchor
    pub fn live_references(&self) -> usize {
        self.runtime.roots().live_count()
    }

    /// Names of every host function installed so far
    pub fn registered_functions(&self) -> Vec<String> {
        self.runtime.dispatch_table().names()
    }

    /// Runtime failures seen by the protector
    pub fn failures(&self) -> u64 {
        self.runtime.protector().failures()
    }

    /// Run a full collection cycle
    pub fn collect_garbage(&self) {
        gc::collect(self.runtime.stack());
    }

    /// Bytes currently allocated by the runtime
    pub fn memory_in_use(&self) -> usize {
        gc::memory_in_use(self.runtime.stack())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("runtime", &self.runtime).finish()
    }
}

/// Global names must survive the trip through the C API
fn global_key(name: &str) -> Result<Variant> {
    if name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(Variant::from(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nul_in_name_is_rejected() {
        let session = Session::new().unwrap();
        assert!(matches!(session.set_global("a\0b", 1), Err(Error::InvalidName(_))));
        assert!(matches!(session.get_global("a\0b"), Err(Error::InvalidName(_))));
        assert!(matches!(session.register("a\0b", || ()), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_weak_session_dies_with_session() {
        let session = Session::new().unwrap();
        let weak = session.downgrade();
        assert!(weak.upgrade().is_some());
        drop(session);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_weak_session_dies_while_references_remain() {
        let session = Session::new().unwrap();
        let weak = session.downgrade();
        let table = session.create_table().unwrap();
        drop(session);
        assert!(weak.upgrade().is_none());
        table.set("still", "usable").unwrap();
        assert_eq!(table.get("still").unwrap(), Variant::from("usable"));
    }

    #[test]
    fn test_absorbed_failures_yield_nil() {
        let session = Session::with_options(StateOptions::default(), None).unwrap();
        session.eval("error('absorbed')").unwrap();
        assert_eq!(session.call("missing_function", ()).unwrap(), Variant::Nil);
        assert_eq!(session.failures(), 2);
        assert_eq!(session.stack_depth(), 0);
    }
}
