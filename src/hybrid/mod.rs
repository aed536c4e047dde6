mod common;
pub use common::*;

mod hybrid_counter;
pub use hybrid_counter::*;
