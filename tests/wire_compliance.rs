// Copyright 2026 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Wire compliance tests
//! Checks encoding/decoding against known urlencoded strings for each
//! nesting convention, plus the parse failures each convention must report.

use std::collections::BTreeMap;

use formwire::{
    Config, DataEncoding, DecodeErrorKind, Error, Nesting, Node, Timestamp, from_str_with,
    to_string_with, urlencoded,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    profile: Profile,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Form {
    user: User,
}

#[test]
fn test_bracket_nesting() {
    let config = Config::default().with_nesting(Nesting::Brackets);
    let form = Form {
        user: User {
            profile: Profile {
                name: "John".to_string(),
            },
        },
    };

    let wire = to_string_with(&form, &config).expect("serialize");
    assert!(
        wire.contains("user[profile][name]=John"),
        "Expected bracket path in `{}`",
        wire
    );

    let node = urlencoded::parse(&wire, Nesting::Brackets).expect("parse");
    let name = node
        .get("user")
        .and_then(|user| user.get("profile"))
        .and_then(|profile| profile.get("name"))
        .and_then(Node::as_str);
    assert_eq!(name, Some("John"));

    let back: Form = from_str_with(&wire, &config).expect("deserialize");
    assert_eq!(back, form);
}

#[test]
fn test_indexed_contiguity() {
    #[derive(Debug, PartialEq, Deserialize)]
    struct Basket {
        items: [String; 2],
    }

    let config = Config::default().with_nesting(Nesting::Indexed);

    let basket: Basket =
        from_str_with("items[0]=apple&items[1]=banana", &config).expect("deserialize");
    assert_eq!(basket.items, ["apple".to_string(), "banana".to_string()]);

    // order on the wire does not matter
    let basket: Basket =
        from_str_with("items[1]=banana&items[0]=apple", &config).expect("deserialize");
    assert_eq!(basket.items, ["apple".to_string(), "banana".to_string()]);

    let err = from_str_with::<Basket>("items[0]=apple&items[2]=banana", &config).unwrap_err();
    println!("gap error: {err}");
    assert!(
        matches!(err, Error::Decode(ref e) if e.is_type_mismatch()),
        "Expected a decode error for a gap at index 1, got {:?}",
        err
    );
}

#[test]
fn test_indexed_maps_with_digit_keys() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Labels {
        m: BTreeMap<String, String>,
    }

    let config = Config::default().with_nesting(Nesting::Indexed);
    let mut m = BTreeMap::new();
    m.insert("1".to_string(), "one".to_string());
    m.insert("x".to_string(), "ex".to_string());
    let labels = Labels { m };
    assert_encode_decode(&labels, "m[1]=one&m[x]=ex", &config);

    let reversed: Labels = from_str_with("m[x]=ex&m[1]=one", &config).expect("deserialize");
    assert_eq!(reversed, labels);
}

#[test]
fn test_indexed_append_overflow() {
    let config = Config::default().with_nesting(Nesting::Indexed);
    let wire = format!("a[{}]=x&a[]=y", usize::MAX);
    let err = from_str_with::<BTreeMap<String, Vec<String>>>(&wire, &config).unwrap_err();
    println!("overflow error: {err}");
    assert!(matches!(err, Error::Decode(ref e) if e.is_invalid_format()));
}

#[test]
fn test_accumulate_vectors() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Filter {
        tag: Vec<String>,
        page: u32,
    }

    let config = Config::default();
    let filter = Filter {
        tag: vec!["rust".to_string(), "web dev".to_string()],
        page: 2,
    };
    assert_encode_decode(&filter, "page=2&tag=rust&tag=web+dev", &config);

    let single: Filter = from_str_with("tag=rust&page=1", &config).expect("deserialize");
    assert_eq!(single.tag, vec!["rust".to_string()]);
}

#[test]
fn test_bracket_sequences() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        lines: Vec<Line>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        sku: String,
        qty: u8,
    }

    let order = Order {
        lines: vec![
            Line {
                sku: "A-1".to_string(),
                qty: 2,
            },
            Line {
                sku: "B-2".to_string(),
                qty: 1,
            },
        ],
    };
    let expected = "lines[0][qty]=2&lines[0][sku]=A-1&lines[1][qty]=1&lines[1][sku]=B-2";
    assert_encode_decode(&order, expected, &Config::default().with_nesting(Nesting::Brackets));
    assert_encode_decode(&order, expected, &Config::default().with_nesting(Nesting::Indexed));

    // nested containers cannot repeat a bare key
    let err = to_string_with(&order, &Config::default()).unwrap_err();
    assert!(matches!(err, Error::Encode(_)));
    assert_eq!(
        err.to_string(),
        "cannot encode value at `lines[0]`: repeated keys can only carry scalar values"
    );
}

#[test]
fn test_append_segments() {
    let node = urlencoded::parse("tag[]=a&tag[]=b&user[roles][]=admin", Nesting::Brackets)
        .expect("parse");
    let tags = node.get("tag").and_then(Node::as_sequence).expect("tag sequence");
    assert_eq!(tags, &[Node::from("a"), Node::from("b")]);

    let roles = node
        .get("user")
        .and_then(|user| user.get("roles"))
        .and_then(Node::as_sequence)
        .expect("roles sequence");
    assert_eq!(roles, &[Node::from("admin")]);
}

#[test]
fn test_escaped_keys_and_values() {
    let mut form = BTreeMap::new();
    form.insert("a b".to_string(), "x&y=z".to_string());
    form.insert("caf\u{e9}".to_string(), "100%".to_string());
    form.insert("plain".to_string(), "-._~".to_string());
    assert_encode_decode(
        &form,
        "a+b=x%26y%3Dz&caf%C3%A9=100%25&plain=-._~",
        &Config::default(),
    );

    // encoded brackets are key text, not nesting
    let node = urlencoded::parse("a%5Bb%5D=1", Nesting::Brackets).expect("parse");
    assert_eq!(node.get("a[b]").and_then(Node::as_str), Some("1"));
}

#[test]
fn test_bytes_strategies() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    }

    let blob = Blob {
        data: vec![0, 255, 16],
    };
    assert_encode_decode(&blob, "data=AP8Q", &Config::default());
    assert_encode_decode(
        &blob,
        "data=0&data=255&data=16",
        &Config::default().with_data(DataEncoding::Deferred),
    );
    assert_encode_decode(
        &blob,
        "data[0]=0&data[1]=255&data[2]=16",
        &Config::default()
            .with_nesting(Nesting::Indexed)
            .with_data(DataEncoding::Deferred),
    );
}

#[test]
fn test_timestamp_defaults_to_rfc3339() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        at: Timestamp,
    }

    let event = Event {
        at: Timestamp::from_millis(1_705_314_600_250).unwrap(),
    };
    assert_encode_decode(&event, "at=2024-01-15T10%3A30%3A00.250Z", &Config::default());
}

#[test]
fn test_enums() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    enum Status {
        Active,
        Suspended,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Shape {
        Circle { radius: u32 },
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Account {
        status: Status,
        shape: Shape,
    }

    let account = Account {
        status: Status::Suspended,
        shape: Shape::Circle { radius: 3 },
    };
    assert_encode_decode(
        &account,
        "shape[Circle][radius]=3&status=suspended",
        &Config::default(),
    );

    let active: Account =
        from_str_with("status=active&shape[Circle][radius]=1", &Config::default())
            .expect("deserialize");
    assert_eq!(active.status, Status::Active);
}

#[test]
fn test_malformed_input() {
    let cases = [
        ("a]=1", Nesting::Brackets),
        ("[a]=1", Nesting::Brackets),
        ("a[b]c=1", Nesting::Brackets),
        ("a[b=1", Nesting::Indexed),
        ("a[[b]]=1", Nesting::Brackets),
        ("a=%FF", Nesting::Accumulate),
        ("a=1&a[b]=2", Nesting::Brackets),
    ];
    for (wire, nesting) in cases {
        let err = urlencoded::parse(wire, nesting).unwrap_err();
        println!("`{wire}`: {err}");
        assert!(
            matches!(err.kind(), DecodeErrorKind::InvalidFormat(_)),
            "Expected InvalidFormat for `{}`, got {:?}",
            wire,
            err
        );
    }

    let deep = format!("a{}=1", "[x]".repeat(80));
    assert!(urlencoded::parse(&deep, Nesting::Brackets).is_err());
}

#[test]
fn test_empty_input() {
    let node = urlencoded::parse("", Nesting::Accumulate).expect("parse");
    assert_eq!(node, Node::Mapping(Vec::new()));

    let form: BTreeMap<String, String> = formwire::from_str("").expect("deserialize");
    assert!(form.is_empty());
}

fn assert_encode_decode<T>(value: &T, expected: &str, config: &Config)
where
    T: Serialize + serde::de::DeserializeOwned + std::fmt::Debug + PartialEq,
{
    // Test encoding
    let encoded = to_string_with(value, config).unwrap();
    assert_eq!(encoded, expected, "Encoding mismatch for {:?}", value);

    // Test decoding
    let decoded: T = from_str_with(expected, config).unwrap();
    assert_eq!(&decoded, value, "Decoding mismatch for {}", expected);
}
