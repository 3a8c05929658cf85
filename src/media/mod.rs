//! Media payload inspection

pub mod flv;
