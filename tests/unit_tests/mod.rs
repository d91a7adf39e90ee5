mod common;
mod quadrature;
