use crate::collection::Collection;
use crate::model::Model;
use serde::Serialize;

/// One page of models plus page metadata.
///
/// `from` and `to` are 1-based positions of the first and last model of the
/// page within the whole result, both `0` when the page is empty.
#[derive(Debug, Clone, Serialize)]
#[serde(bound(serialize = ""))]
pub struct Paginator<M: Model> {
    pub data: Collection<M>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub from: u64,
    pub to: u64,
}

impl<M: Model> Paginator<M> {
    pub fn new(data: Collection<M>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        let (from, to) = if data.is_empty() {
            (0, 0)
        } else {
            let from = current_page
                .saturating_sub(1)
                .saturating_mul(per_page)
                .saturating_add(1);
            (from, from.saturating_add(data.len() as u64 - 1))
        };
        Self {
            data,
            total,
            per_page,
            current_page,
            last_page,
            from,
            to,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn on_first_page(&self) -> bool {
        self.current_page <= 1
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Collection<M> {
        self.data
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "data": self.data.to_json(),
            "total": self.total,
            "per_page": self.per_page,
            "current_page": self.current_page,
            "last_page": self.last_page,
            "from": self.from,
            "to": self.to,
        })
    }
}
