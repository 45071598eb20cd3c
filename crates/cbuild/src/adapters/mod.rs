//! Default driver implementations for the narrow contracts `cbuild_driver`
//! and `cbuild_catalog` define. All three external domains (VCS client,
//! container runtime, object storage) are non-goals; what lives here is
//! the thinnest adapter that makes `cbuild server`/`worker` runnable out
//! of the box, not a faithful reimplementation of any of them.

pub mod builder;
pub mod resolver;
pub mod source;
pub mod storage;
