#![allow(dead_code)]

use formation::FormValues;

#[derive(FormValues)]
struct Coordinates(String, String);

fn main() {}
