//! 分页结果

use serde::{Deserialize, Serialize};

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// 分页视图
///
/// 每次查询重新计算，不做缓存。`total_count` 始终是未过滤数据源的大小。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    offset: usize,
    page_size: usize,
    data: Vec<T>,
    total_count: usize,
}

impl<T> Page<T> {
    pub fn new(offset: usize, page_size: usize, data: Vec<T>, total_count: usize) -> Self {
        Self {
            offset,
            page_size,
            data,
            total_count,
        }
    }

    /// 在数据源上截取 `[offset, offset + page_size)`
    pub fn slice(all: Vec<T>, offset: usize, page_size: usize) -> Self {
        let total_count = all.len();
        let data = all.into_iter().skip(offset).take(page_size).collect();
        Self::new(offset, page_size, data, total_count)
    }

    /// 从数据源下标 `offset` 开始向后扫描，收集最多 `page_size` 个满足条件的元素
    ///
    /// `offset` 作用于数据源下标而不是匹配计数，相同的查询重复执行得到相同的页。
    pub fn filtered<F>(all: Vec<T>, offset: usize, page_size: usize, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        let total_count = all.len();
        let data = all
            .into_iter()
            .skip(offset)
            .filter(|item| predicate(item))
            .take(page_size)
            .collect();
        Self::new(offset, page_size, data, total_count)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        if self.page_size == 0 {
            return false;
        }
        self.offset / self.page_size + 1 < self.total_pages()
    }
}
