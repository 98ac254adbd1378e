//! Library side of the `tabtest` tool: CSV input, table construction from
//! command-line arguments, terminal rendering and logging setup.

pub mod input;
pub mod logging;
pub mod summary;
