pub mod check;
pub mod cli;
pub mod error;
pub mod model;
pub mod parsers;
pub mod ratio;
pub mod report;
pub mod steptime;
