pub mod history;
pub mod layers;
pub mod shortcuts;
pub mod tools;
