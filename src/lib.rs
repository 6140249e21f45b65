pub mod association;
pub mod command;
pub mod config;
pub mod error;
pub mod geometry;
pub mod group;
pub mod math;
pub mod mesh;
pub mod meshing;
pub mod model;
pub mod operations;
pub mod store;
pub mod topology;

pub use command::{Command, CommandContext, EngineState, Session};
pub use config::SessionConfig;
pub use error::{ErrorKind, Result, TopomeshError};
pub use model::{EntityRef, Model};
