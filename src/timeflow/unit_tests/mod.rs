mod cache_tests;
mod hierarchy_tests;
