//! Built-in enhancers, composed by [`create_store`](crate::create_store).

mod batch;
mod devtools;
mod preload;

pub use batch::with_batch;
pub use devtools::with_devtools;
pub use preload::with_preload;
