#![allow(dead_code)]

use formation::FormValues;

#[derive(FormValues)]
struct Signup {
    #[form(renamed = "zip")]
    postal_code: Option<i64>,
}

fn main() {}
