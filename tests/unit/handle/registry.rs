use super::*;

fn registry() -> HandleRegistry {
    HandleRegistry::new(BridgeId::next())
}

#[test]
fn destroy_is_idempotent() {
    let mut reg = registry();
    let h = reg.adopt(Image::new(2, 2));
    assert_eq!(reg.len(), 1);
    assert!(reg.destroy(&h));
    assert!(!reg.destroy(&h));
    assert!(reg.is_empty());
    assert!(matches!(
        reg.with(&h, |_| ()),
        Err(BridgeError::InvalidHandle(_))
    ));
}

#[test]
fn owning_handles_are_unique_per_object() {
    let mut reg = registry();
    let a = reg.adopt(Image::filled(1, 1, [1, 2, 3, 255]));
    let b = reg.adopt(Image::filled(1, 1, [1, 2, 3, 255]));
    assert_ne!(a.id(), b.id());

    reg.with_mut(&a, |img| img.data_mut()[0] = 9).unwrap();
    assert_eq!(reg.with(&a, |img| img.data()[0]).unwrap(), 9);
    assert_eq!(reg.with(&b, |img| img.data()[0]).unwrap(), 1);

    assert!(reg.destroy(&a));
    assert_eq!(reg.with(&b, |img| img.width()).unwrap(), 1);
}

#[test]
fn stale_ids_never_alias_new_objects() {
    let mut reg = registry();
    let old = reg.adopt(Image::new(1, 1));
    reg.destroy(&old);
    let new = reg.adopt(Image::new(3, 3));
    assert_ne!(old.id(), new.id());
    assert!(!reg.is_live(&old));
    assert_eq!(reg.with(&new, |img| img.width()).unwrap(), 3);
}

#[test]
fn borrowed_handle_fails_after_owner_releases() {
    let mut reg = registry();
    let storage = Arc::new(Image::new(4, 4));
    let h = reg.lend(&storage);
    assert_eq!(h.ownership(), OwnershipKind::Borrowing);
    assert_eq!(reg.with(&h, |img| img.height()).unwrap(), 4);

    drop(storage);
    assert!(matches!(
        reg.with(&h, |img| img.height()),
        Err(BridgeError::InvalidHandle(_))
    ));
    // Destroying a borrowed handle only forgets it.
    assert!(reg.destroy(&h));
}

#[test]
fn destroying_borrowed_handle_keeps_object_alive() {
    let mut reg = registry();
    let storage = Arc::new(Image::new(2, 1));
    let a = reg.lend(&storage);
    let b = reg.lend(&storage);
    assert!(reg.destroy(&a));
    assert_eq!(Arc::strong_count(&storage), 1);
    assert_eq!(reg.with(&b, |img| img.width()).unwrap(), 2);
}

#[test]
fn foreign_handles_are_rejected() {
    let mut a = registry();
    let mut b = registry();
    let h = a.adopt(Context::new());
    assert!(matches!(
        b.with(&h, |_| ()),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(!b.destroy(&h));
    assert!(a.is_live(&h));
}

#[test]
fn take_moves_object_out() {
    let mut reg = registry();
    let h = reg.adopt(Image::new(5, 1));
    let img = reg.take(h).unwrap();
    assert_eq!(img.width(), 5);
    assert!(reg.is_empty());
}

#[test]
fn cloned_copies_context() {
    let mut reg = registry();
    let mut ctx = Context::new();
    ctx.insert("bg", Default::default());
    let h = reg.adopt(ctx);
    let copy = reg.cloned(&h).unwrap();
    reg.with_mut(&h, |c| c.remove("bg")).unwrap();
    assert!(copy.contains("bg"));
    assert!(!reg.with(&h, |c| c.contains("bg")).unwrap());
}
