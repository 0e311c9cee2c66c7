mod common;

mod submit;
