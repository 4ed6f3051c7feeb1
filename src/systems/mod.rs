pub mod camera;
pub mod clouds;
pub mod noise;
pub mod preview;
