//! Turn tracking: an optional decorator around every dispatch.
//!
//! A wrapper receives the dispatch function of one send and returns the
//! function that is actually called. Installing one per thread replaces the
//! built-in wrapper, which only runs when [`Config::track_turns`] is set and
//! annotates dispatch errors with the sending turn and call site.

use core::cell::{Cell, RefCell};
use std::panic::Location;
use std::rc::Rc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::turn;
use crate::value::Value;

/// Performs one dispatch: `(handler name, handler, resolved target)`.
pub type DispatchFn = Rc<dyn Fn(&str, Rc<dyn Handler>, Value) -> Result<Value>>;

/// Decorates a dispatch function.
pub type Wrapper = Rc<dyn Fn(DispatchFn) -> DispatchFn>;

thread_local! {
    static WRAPPER: RefCell<Option<Wrapper>> = const { RefCell::new(None) };
    static SITE: Cell<Option<&'static Location<'static>>> = const { Cell::new(None) };
}

/// Run `f` with `site` recorded as the origin of the send being dispatched.
pub(crate) fn at_site<R>(site: &'static Location<'static>, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<&'static Location<'static>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            SITE.with(|s| s.set(self.0));
        }
    }

    let _restore = Restore(SITE.with(|s| s.replace(Some(site))));
    f()
}

/// Call site of the send currently being dispatched, if any. Sends a handler
/// issues on behalf of that send are attributed to it.
pub(crate) fn current_site() -> Option<&'static Location<'static>> {
    SITE.with(|s| s.get())
}

/// Install `wrapper` for sends made on this thread, returning the one it
/// replaces.
pub fn install(wrapper: impl Fn(DispatchFn) -> DispatchFn + 'static) -> Option<Wrapper> {
    WRAPPER.with(|w| w.borrow_mut().replace(Rc::new(wrapper)))
}

/// Remove the installed wrapper, restoring the built-in behaviour.
pub fn uninstall() -> Option<Wrapper> {
    WRAPPER.with(|w| w.borrow_mut().take())
}

pub(crate) fn wrap(dispatch: DispatchFn, site: &'static Location<'static>) -> DispatchFn {
    if let Some(wrapper) = WRAPPER.with(|w| w.borrow().clone()) {
        return wrapper(dispatch);
    }
    if !Config::current().track_turns {
        return dispatch;
    }
    let sent_in = turn::current_turn();
    Rc::new(move |handler_name: &str, handler: Rc<dyn Handler>, o: Value| {
        dispatch(handler_name, handler, o).map_err(|source| Error::Annotated {
            note: format!("sent at {site} in turn {sent_in}, delivered by {handler_name}"),
            source: Box::new(source),
        })
    })
}
