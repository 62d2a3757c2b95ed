pub mod user_time;
