pub mod attendance;
pub mod calendar;
pub mod dom;
pub mod grades;
pub mod portal;
