//! Hook backends: responsibility and boundaries
//!
//! A backend owns the OS side of interception only: acquiring the global hook,
//! reading raw key transitions, handing each one to `HookEngine::process`, and
//! carrying out the verdict. It MUST NOT look at the mapping table itself.

mod dry_run;
mod evdev_hook;
mod r#trait;

pub use self::r#trait::{create_hook_backend, HookBackend, HookHandle};
