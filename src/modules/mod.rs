pub mod dropout;
pub mod elu;
