mod infos;
mod integrity;

pub use infos::{EntityInfo, Infos};
pub use integrity::check_integrity;
