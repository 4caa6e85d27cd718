pub mod backend;
pub mod benchmark_group;
pub mod cable_cell;
pub mod cable_group;
pub mod cell_group;
pub mod communicator;
pub mod connection;
pub mod context;
pub mod distributed;
pub mod embed;
pub mod engine;
pub mod error;
pub mod event;
pub mod fvm;
pub mod generator;
pub mod label;
pub mod lif_group;
pub mod load_balance;
pub mod mechanism;
pub mod mechanisms;
pub mod morphology;
pub mod params;
pub mod probe;
pub mod recipe;
pub mod schedule;
pub mod spike_source_group;
pub mod spike_store;
pub mod threading;
pub mod types;

pub use context::Context;
pub use engine::Simulation;
pub use error::{Result, SimulationError};
pub use load_balance::partition_load_balance;
pub use recipe::Recipe;
