use formation::{FormValues, ModelValue};

#[derive(Debug, PartialEq, formation::FormValues)]
struct Address {
    city: String,
}

#[derive(Debug, PartialEq, formation::FormValues)]
struct Signup {
    email: String,
    #[form(rename = "zip")]
    postal_code: Option<i64>,
    address: Address,
}

fn main() {
    let signup = Signup {
        email: "neo@example.com".to_string(),
        postal_code: Some(1234),
        address: Address {
            city: "Oslo".to_string(),
        },
    };

    let values = signup.to_model_values();
    assert_eq!(values.get("zip"), Some(&ModelValue::from(1234_i64)));
    assert_eq!(
        values.get("address").and_then(|address| address.get("city")),
        Some(&ModelValue::from("Oslo"))
    );
    assert_eq!(Signup::from_model_values(&values), Some(signup));
}
