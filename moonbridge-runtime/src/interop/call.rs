//! Function wrappers and the shared dispatch entry point
//!
//! The runtime only knows one native signature, `(thread) -> result count`.
//! Every registered host callable is erased behind `Wrapper` and bound to the
//! same `dispatch` function; the wrapper's address travels as the closure's
//! single upvalue.

use core::marker::PhantomData;
use core::ptr::NonNull;
use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::abi::Stack;
use super::convert::{HostFunction, Params, ToStack};
use super::types::Variant;
use crate::error::{Error, Result};
use crate::ffi::{c_name, store_field, sys, Reference};
use crate::logging::{debug, log_dispatch, log_function_registered, trace};
use crate::state::RuntimeState;

/// Type-erased host callable, invocable through the native ABI
pub trait Wrapper: 'static {
    /// Name used in diagnostics and argument errors
    fn name(&self) -> &str;

    /// Number of parameters the callable declares
    fn arity(&self) -> usize;

    /// Consume the arguments on `stack`, call the host function and push its
    /// results. Returns the number of results pushed.
    fn invoke(&self, stack: Stack<'_>) -> Result<c_int>;
}

/// Adapter around one host callable with a fixed signature
pub struct FunctionWrapper<F, P, R> {
    name: String,
    func: F,
    _signature: PhantomData<fn(P) -> R>,
}

/// Capture a host callable for registration
pub fn wrap<F, P, R>(name: impl Into<String>, func: F) -> FunctionWrapper<F, P, R>
where
    F: HostFunction<P, R>,
    P: Params,
    R: ToStack + 'static,
{
    FunctionWrapper {
        name: name.into(),
        func,
        _signature: PhantomData,
    }
}

impl<F, P, R> Wrapper for FunctionWrapper<F, P, R>
where
    F: HostFunction<P, R>,
    P: Params,
    R: ToStack + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        P::ARITY
    }

    fn invoke(&self, stack: Stack<'_>) -> Result<c_int> {
        // Arguments fill the whole frame of a native call.
        let supplied = usize::try_from(stack.top()).unwrap_or(0);
        if supplied != P::ARITY {
            return Err(Error::Arity {
                function: self.name.clone(),
                expected: P::ARITY,
                found: supplied,
            });
        }

        let params = P::extract(stack).map_err(|m| Error::ArgType {
            function: self.name.clone(),
            position: m.position,
            expected: m.expected,
            found: m.found,
        })?;
        debug_assert_eq!(stack.top(), 0, "parameters left on the stack");

        self.func.call_with(params).to_stack(stack)
    }
}

/// One installed wrapper plus a way back to its runtime.
///
/// The slot itself lives as long as the runtime, because closures hold its
/// address. The wrapper can be released earlier.
struct DispatchSlot {
    runtime: Weak<RuntimeState>,
    name: String,
    wrapper: RefCell<Option<Rc<dyn Wrapper>>>,
}

/// Owns every wrapper installed into a runtime.
///
/// Slots are never reclaimed individually: rebinding a name leaves the old
/// wrapper alive, since closures captured by scripts may still point at it.
/// A wrapper that captures a `Reference` or `Table` keeps the runtime alive,
/// so owners must call [`DispatchTable::release_all`] before letting go.
#[derive(Default)]
pub struct DispatchTable {
    slots: RefCell<Vec<Rc<DispatchSlot>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wrappers installed so far
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Names of the installed wrappers, in installation order
    pub fn names(&self) -> Vec<String> {
        self.slots
            .borrow()
            .iter()
            .map(|slot| slot.name.clone())
            .collect()
    }

    /// Drop every wrapper, keeping the slots. Closures bound to a released
    /// slot raise a runtime error when called. Returns how many were live.
    pub fn release_all(&self) -> usize {
        let released: Vec<Rc<dyn Wrapper>> = self
            .slots
            .borrow()
            .iter()
            .filter_map(|slot| slot.wrapper.borrow_mut().take())
            .collect();
        let count = released.len();
        // Captured handles may touch the runtime as they drop; no borrow is held.
        drop(released);
        debug!(event = "dispatch_release", functions = count, "host functions released");
        count
    }

    fn adopt(&self, slot: DispatchSlot) -> *mut c_void {
        let slot = Rc::new(slot);
        let address = Rc::as_ptr(&slot) as *mut c_void;
        self.slots.borrow_mut().push(slot);
        address
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("functions", &self.names())
            .finish()
    }
}

/// Push a runtime closure bound to `wrapper`
fn push_closure(runtime: &Rc<RuntimeState>, stack: Stack<'_>, wrapper: Box<dyn Wrapper>) {
    let address = runtime.dispatch_table().adopt(DispatchSlot {
        runtime: Rc::downgrade(runtime),
        name: wrapper.name().to_string(),
        wrapper: RefCell::new(Some(Rc::from(wrapper))),
    });
    stack.push_light_userdata(address);
    unsafe { sys::lua_pushcclosure(stack.as_ptr(), dispatch, 1) };
}

/// Bind `wrapper` as the global function `name`.
///
/// The assignment honors `_G` metamethods under protection, like any other
/// global write.
pub fn install(runtime: &Rc<RuntimeState>, name: &str, wrapper: Box<dyn Wrapper>) -> Result<()> {
    c_name(name)?;
    let arity = wrapper.arity();
    let function = create_function(runtime, wrapper)?;

    let stack = runtime.stack();
    let _guard = stack.guard();
    store_field(stack, |s| s.push_globals(), &Variant::from(name.to_string()), &Variant::from(function))?;

    log_function_registered(name, arity);
    Ok(())
}

/// Create an anonymous runtime function bound to `wrapper`
pub fn create_function(runtime: &Rc<RuntimeState>, wrapper: Box<dyn Wrapper>) -> Result<Reference> {
    let stack = runtime.stack();
    let _guard = stack.guard();
    stack.reserve(3)?;

    push_closure(runtime, stack, wrapper);
    let reference = Reference::acquire(stack, -1);
    stack.pop(1);
    reference
}

/// The one native function the runtime ever calls directly.
///
/// Errors and panics from the host side are turned into runtime errors here;
/// nothing unwinds across the C boundary. No value with a destructor is alive
/// when `lua_error` transfers control back to the runtime.
unsafe extern "C-unwind" fn dispatch(l: *mut sys::lua_State) -> c_int {
    let slot = sys::lua_touserdata(l, sys::lua_upvalueindex(1)) as *const DispatchSlot;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| invoke_slot(l, slot)));
    let message = match outcome {
        Ok(Ok(results)) => return results,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload),
    };
    raise(l, message)
}

fn invoke_slot(l: *mut sys::lua_State, slot: *const DispatchSlot) -> Result<c_int> {
    // Safety: the slot is owned by the runtime's dispatch table, which
    // outlives every closure created against it.
    let slot = unsafe { slot.as_ref() }.ok_or_else(|| Error::callback("missing dispatch slot"))?;
    let runtime = slot
        .runtime
        .upgrade()
        .ok_or_else(|| Error::callback("runtime is shutting down"))?;
    let raw = NonNull::new(l).ok_or_else(|| Error::callback("null runtime thread"))?;

    // Safety: `l` is the thread currently running this native call.
    let stack = unsafe { Stack::from_raw(raw, &runtime) };
    log_dispatch(&slot.name, stack.top());

    // Cloned out so a nested call can release the table without a live borrow.
    let wrapper = slot
        .wrapper
        .borrow()
        .clone()
        .ok_or_else(|| Error::callback(format!("host function '{}' has been released", slot.name)))?;
    let results = wrapper.invoke(stack)?;
    trace!(
        event = "dispatch_return",
        function = slot.name.as_str(),
        results,
        "host function returned"
    );
    Ok(results)
}

/// Raise `message` as a runtime error. Does not return.
unsafe fn raise(l: *mut sys::lua_State, message: String) -> c_int {
    sys::lua_pushlstring(l, message.as_ptr().cast(), message.len());
    drop(message);
    sys::lua_error(l)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("host function panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("host function panicked: {}", s)
    } else {
        "host function panicked".to_string()
    }
}
