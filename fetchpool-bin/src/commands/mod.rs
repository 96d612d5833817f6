pub(crate) mod fetch;
pub(crate) mod serve;

pub(crate) use fetch::fetch;
pub(crate) use serve::serve;
