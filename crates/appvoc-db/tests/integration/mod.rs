mod common;
mod cursor_tests;
mod item_tests;
mod job_tests;
mod project_tests;
