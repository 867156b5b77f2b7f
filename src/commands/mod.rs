pub mod checks;
pub mod report;
pub mod scan;
