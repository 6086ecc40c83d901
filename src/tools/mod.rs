pub mod dispatcher;
pub mod math;
pub mod proxy;
pub mod registry;
