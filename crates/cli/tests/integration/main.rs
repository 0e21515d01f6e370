mod common;

#[cfg(unix)]
mod compile_tests;
#[cfg(unix)]
mod spec_tests;
