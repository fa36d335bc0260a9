#![allow(dead_code)]

use formation::FormValues;

#[derive(FormValues)]
enum Plan {
    Free,
    Paid,
}

fn main() {}
