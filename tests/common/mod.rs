#[allow(dead_code)]
pub(crate) mod fixtures;

#[allow(dead_code)]
pub(crate) mod logging;

#[allow(dead_code)]
pub(crate) mod mock_engine;
