
#[cfg(unix)]
mod converge_tests;
#[cfg(unix)]
mod provision_tests;
