pub(crate) mod domain;
pub(crate) mod html;
