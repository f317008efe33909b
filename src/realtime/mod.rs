pub mod models;
pub use models::*;

mod bus;
pub use bus::*;

mod nats;
pub use nats::*;

mod hub;
pub use hub::*;

mod dispatcher;
pub use dispatcher::*;

mod ws;
pub use ws::polls_ws;
