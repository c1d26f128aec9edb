pub mod local;
pub mod postgres;

pub use local::LocalBus;
pub use postgres::PgBus;
