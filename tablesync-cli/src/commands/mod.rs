pub mod merge;
pub mod update_stars;
