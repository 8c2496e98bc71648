//! Flow tests driven by scripted collaborators.
//!
//! Nothing here needs a model endpoint, a Python interpreter or a database
//! server: `support` provides a scripted LLM, a scripted sandbox and
//! in-memory stores.

pub mod support;

mod sql_loop;
