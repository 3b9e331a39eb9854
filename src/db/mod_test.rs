use super::*;

#[test]
fn test_addr() {
    let addr = Addr::new(10_250);
    assert_eq!(addr.to_u64(), 10_250);
    assert_eq!(addr.to_bank(1024), (10, 10));
    assert!(!addr.is_null());
    assert!(Addr::NULL.is_null());

    assert_eq!(format!("{}", addr), "addr:280a");
    assert_eq!(format!("{}", Addr::NULL), "addr:null");
}

#[test]
fn test_rec() {
    let data: Arc<[u8]> = Arc::from(vec![1_u8, 2, 3, 4]);
    let rec = Rec::new(Addr::new(7), Arc::clone(&data), 42);

    assert_eq!(rec.as_bytes(), &[1, 2, 3, 4]);
    assert_eq!(rec.to_addr(), Addr::new(7));
    assert_eq!(rec.to_seconds(), 42);
    assert_eq!(rec.len(), 4);
    assert!(!rec.is_empty());

    let moved = rec.rebind(Addr::new(3));
    assert_eq!(moved.to_addr(), Addr::new(3));
    assert_eq!(moved.to_seconds(), 42);
    assert_eq!(moved.as_bytes(), rec.as_bytes());
    assert!(Arc::ptr_eq(&moved.to_payload(), &rec.to_payload()));
}
