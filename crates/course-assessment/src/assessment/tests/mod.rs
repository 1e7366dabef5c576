mod assignments;
mod certificates;
mod common;
mod concurrency;
mod progress;
