use keygate_types::{Page, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[test]
fn page_clamps_out_of_range_values() {
    let page = Page::new(0, 0);
    assert_eq!(page.number, 1);
    assert_eq!(page.per_page, 1);

    let page = Page::new(2, MAX_PAGE_SIZE + 50);
    assert_eq!(page.per_page, MAX_PAGE_SIZE);
}

#[test]
fn default_page_is_first_page() {
    let page = Page::default();
    assert_eq!(page.number, 1);
    assert_eq!(page.per_page, DEFAULT_PAGE_SIZE);
    assert_eq!(page.offset(), 0);
    assert_eq!(page.limit(), DEFAULT_PAGE_SIZE);
}

#[test]
fn offset_advances_by_page_size() {
    let page = Page::new(3, 50);
    assert_eq!(page.offset(), 100);
}

#[test]
fn offset_survives_extreme_page_numbers() {
    // A hostile page query parameter must not be able to overflow the
    // offset arithmetic.
    let page = Page::new(u32::MAX, MAX_PAGE_SIZE);
    assert_eq!(
        page.offset(),
        u64::from(u32::MAX - 1) * u64::from(MAX_PAGE_SIZE)
    );
}
