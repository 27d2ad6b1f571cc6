pub mod achievement;
pub mod category;
pub mod goal;
pub mod profile;
pub mod task;
