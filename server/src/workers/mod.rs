//! Background workers that sit between the simulation and the outside
//! world: fan-out to clients, character loading, and saving.

pub mod broadcast;
pub mod connection;
pub mod persistence;

pub use broadcast::{BroadcastMessage, BroadcastWorker, Delivery};
pub use connection::ConnectionWorker;
pub use persistence::{PersistenceWorker, SaveRequest};
