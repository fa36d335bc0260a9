#![allow(dead_code)]

use formation::FormValues;

#[derive(FormValues)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
