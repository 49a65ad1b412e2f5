use crate::{ErrorKind, FetchError};

#[test]
fn taxonomy() {
    let transient = FetchError::transient("connection reset");
    assert_eq!(transient.kind(), ErrorKind::Transient);
    assert!(transient.is_transient());

    let permanent = FetchError::permanent("no such key");
    assert_eq!(permanent.kind(), ErrorKind::Permanent);
    assert!(!permanent.is_transient());
    assert_eq!(permanent.message(), "no such key");
}

#[test]
fn display() {
    assert_eq!(ErrorKind::Transient.to_string(), "transient");
    assert_eq!(
        FetchError::permanent("no such key").to_string(),
        "permanent fetch error: no such key"
    );
}
