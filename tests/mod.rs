extern crate assert_cli;
extern crate mesh_node;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod integration;
mod unit;
