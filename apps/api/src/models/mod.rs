pub mod coach;
pub mod fact;
pub mod mode;
