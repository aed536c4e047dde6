mod common;
pub use common::*;

mod shared_store;
pub use shared_store::*;

mod redis_store;
pub use redis_store::*;

mod stock_lock;
pub use stock_lock::lock_retry_delay;

mod distributed_counter;
pub use distributed_counter::*;
