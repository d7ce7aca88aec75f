//! 分页测试

use flare_discovery_consul::discovery::DEFAULT_PAGE_SIZE;
use flare_discovery_consul::{Page, ServiceInstance};

fn instances(health: &[bool]) -> Vec<ServiceInstance> {
    health
        .iter()
        .enumerate()
        .map(|(i, healthy)| {
            ServiceInstance::new(format!("ins-{}", i), "svc", "10.0.0.1", 20000 + i as u16)
                .with_health(*healthy)
        })
        .collect()
}

fn ids(page: &Page<ServiceInstance>) -> Vec<&str> {
    page.data().iter().map(|ins| ins.id.as_str()).collect()
}

#[test]
fn slice_first_page() {
    let page = Page::slice(instances(&[true; 5]), 0, 2);
    assert_eq!(ids(&page), vec!["ins-0", "ins-1"]);
    assert_eq!(page.total_count(), 5);
    assert_eq!(page.data_size(), 2);
    assert_eq!(page.offset(), 0);
    assert_eq!(page.page_size(), 2);
    assert!(page.has_data());
}

#[test]
fn slice_last_partial_page() {
    let page = Page::slice(instances(&[true; 5]), 4, 2);
    assert_eq!(ids(&page), vec!["ins-4"]);
    assert_eq!(page.total_count(), 5);
}

#[test]
fn slice_past_the_end_is_empty() {
    let page = Page::slice(instances(&[true; 3]), 10, 2);
    assert!(!page.has_data());
    assert_eq!(page.total_count(), 3);
}

#[test]
fn filtered_keeps_source_order_and_unfiltered_total() {
    let page = Page::filtered(instances(&[true, false, true, true]), 0, 2, |ins| ins.healthy);
    assert_eq!(ids(&page), vec!["ins-0", "ins-2"]);
    assert_eq!(page.total_count(), 4);
}

#[test]
fn filtered_unhealthy() {
    let page = Page::filtered(instances(&[true, false, true, false]), 0, 10, |ins| !ins.healthy);
    assert_eq!(ids(&page), vec!["ins-1", "ins-3"]);
    assert_eq!(page.total_count(), 4);
}

#[test]
fn filtered_offset_applies_to_source_index() {
    // 从下标 1 开始扫描，跳过的是数据源元素而不是匹配项
    let page = Page::filtered(instances(&[true, false, true, true]), 1, 2, |ins| ins.healthy);
    assert_eq!(ids(&page), vec!["ins-2", "ins-3"]);

    let again = Page::filtered(instances(&[true, false, true, true]), 1, 2, |ins| ins.healthy);
    assert_eq!(page, again);
}

#[test]
fn page_navigation() {
    let page = Page::slice(instances(&[true; 5]), 0, 2);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next());

    let last = Page::slice(instances(&[true; 5]), 4, 2);
    assert!(!last.has_next());

    let empty: Page<ServiceInstance> = Page::slice(Vec::new(), 0, 0);
    assert_eq!(empty.total_pages(), 0);
    assert!(!empty.has_next());
}

#[test]
fn default_page_size() {
    assert_eq!(DEFAULT_PAGE_SIZE, 100);
    let page = Page::slice(instances(&[true; 3]), 0, DEFAULT_PAGE_SIZE);
    assert_eq!(page.into_data().len(), 3);
}
