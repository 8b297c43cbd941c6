pub mod banners;
pub mod health;
