use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
    pub message: Option<String>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, current_offset: i64) -> Self {
        if rows.is_empty() {
            return Self::no_rows();
        }
        let last = current_offset + rows.len() as i64;
        let next_offset = (last < total_rows).then_some(last);
        let prev_offset = (current_offset > 0).then(|| (current_offset - page_size).max(0));

        Self {
            rows,
            total_rows,
            next_offset,
            prev_offset,
            message: Some(format!(
                "{} - {} / {}",
                current_offset + 1,
                last,
                total_rows
            )),
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            next_offset: None,
            prev_offset: None,
            message: Some(String::from("No results")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_has_no_prev() {
        let page = PageContext::from_rows(vec![1, 2, 3], 7, 3, 0);
        assert_eq!(page.next_offset, Some(3));
        assert_eq!(page.prev_offset, None);
        assert_eq!(page.message.as_deref(), Some("1 - 3 / 7"));
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageContext::from_rows(vec![4, 5, 6], 7, 3, 3);
        assert_eq!(page.next_offset, Some(6));
        assert_eq!(page.prev_offset, Some(0));
    }

    #[test]
    fn last_partial_page_has_no_next() {
        let page = PageContext::from_rows(vec![7], 7, 3, 6);
        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(3));
        assert_eq!(page.message.as_deref(), Some("7 - 7 / 7"));
    }

    #[test]
    fn empty_result_set() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, 3, 0);
        assert_eq!(page.total_rows, 0);
        assert_eq!(page.message.as_deref(), Some("No results"));
    }
}
