pub mod arity;
