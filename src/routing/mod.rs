//! Route resolution and request rewriting
//!
//! A route table maps the first path segment of a request (the route key)
//! to a destination URL. The table is loaded once, shared read-only by all
//! connections, and replaced as a whole on reload.
//!
//! - **`loader`**: builds a [`RouteTable`] from a line-oriented or YAML/JSON file
//! - **`table`**: the immutable table and the handle that shares it
//! - **`director`**: rewrites an inbound request into its outbound form
//! - **`fallback`**: the response for requests no route accepts

pub mod director;
pub mod fallback;
pub mod loader;
pub mod table;

pub use director::{rewrite, Director, ForwardRequest};
pub use fallback::FallbackPolicy;
pub use loader::{load, load_file, LoadedTable, RouteTableFormat};
pub use table::{RouteTable, RouteTableHandle};
