//! Redis plumbing: the admission script, the store seam, and script registration.
//!
//! The admission decision runs as a Lua script inside Redis, so concurrent
//! callers on any number of hosts cannot race past the limit. Callers never
//! upload the script on the hot path; they invoke it by SHA1 digest and rely on
//! [`ScriptRegistrar`] to keep it cached in the server.

mod admission_script;
pub use admission_script::*;

mod script_registrar;
pub use script_registrar::*;

mod store;
pub use store::*;
