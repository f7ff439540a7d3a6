pub mod logbook;
pub mod path;
