//! 通知优先级
//!
//! 比较规则：
//!
//! 1. 先比较排序值，越小优先级越高
//! 2. 排序值相同且属于同一切面时，按声明顺序：
//!    - 有一方是 after 类通知时，后声明的优先
//!    - 否则先声明的优先
//! 3. 其余情况返回 `Equal`，表示“没有意见”，不代表可以互换
//!
//! 由于 `Equal` 不可传递，这不是全序，不能直接交给 `sort_by`；
//! 使用 [`sort_by_precedence`] 做偏序稳定排序。

use std::cmp::Ordering;
use std::sync::Arc;

use crate::metadata::AdviceKind;

/// 带排序值的对象
pub trait Ordered {
    fn order(&self) -> i32;
}

/// 同一切面内的声明信息
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrecedenceInformation {
    pub aspect_name: String,
    pub declaration_order: usize,
    pub advice_kind: AdviceKind,
}

/// 参与优先级比较的对象
pub trait PrecedenceAware: Ordered {
    fn precedence_information(&self) -> Option<&PrecedenceInformation>;
}

impl<T: Ordered + ?Sized> Ordered for Arc<T> {
    fn order(&self) -> i32 {
        (**self).order()
    }
}

impl<T: PrecedenceAware + ?Sized> PrecedenceAware for Arc<T> {
    fn precedence_information(&self) -> Option<&PrecedenceInformation> {
        (**self).precedence_information()
    }
}

/// AspectJ 优先级比较器；`Less` 表示 `a` 优先级更高
#[derive(Debug, Default, Clone, Copy)]
pub struct AspectJPrecedenceComparator;

impl AspectJPrecedenceComparator {
    pub fn compare<T: PrecedenceAware + ?Sized>(&self, a: &T, b: &T) -> Ordering {
        let by_order = a.order().cmp(&b.order());
        if by_order != Ordering::Equal {
            return by_order;
        }

        let (Some(pa), Some(pb)) = (a.precedence_information(), b.precedence_information()) else {
            return Ordering::Equal;
        };
        if pa.aspect_name != pb.aspect_name {
            return Ordering::Equal;
        }

        let declared = pa.declaration_order.cmp(&pb.declaration_order);
        if pa.advice_kind.is_after() || pb.advice_kind.is_after() {
            // 后声明的优先
            declared.reverse()
        } else {
            declared
        }
    }

    /// `a` 是否严格优先于 `b`
    pub fn precedes<T: PrecedenceAware + ?Sized>(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Less
    }
}

/// 稳定的偏序排序
///
/// 每一步选出剩余元素中第一个不被其他任何剩余元素严格优先的元素。
/// 没有意见的元素保持原有相对顺序。
pub fn sort_by_precedence<T: PrecedenceAware>(items: Vec<T>) -> Vec<T> {
    let comparator = AspectJPrecedenceComparator;
    let mut remaining = items;
    let mut sorted = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = (0..remaining.len())
            .find(|&i| {
                !remaining
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && comparator.precedes(other, &remaining[i]))
            })
            // 比较结果出现环时退回原顺序
            .unwrap_or(0);
        sorted.push(remaining.remove(next));
    }

    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Item {
        label: &'static str,
        order: i32,
        info: Option<PrecedenceInformation>,
    }

    impl Ordered for Item {
        fn order(&self) -> i32 {
            self.order
        }
    }

    impl PrecedenceAware for Item {
        fn precedence_information(&self) -> Option<&PrecedenceInformation> {
            self.info.as_ref()
        }
    }

    fn item(label: &'static str, order: i32, aspect: &str, declared: usize, kind: AdviceKind) -> Item {
        Item {
            label,
            order,
            info: Some(PrecedenceInformation {
                aspect_name: aspect.to_string(),
                declaration_order: declared,
                advice_kind: kind,
            }),
        }
    }

    fn labels(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.label).collect()
    }

    #[test]
    fn test_explicit_order_wins() {
        let cmp = AspectJPrecedenceComparator;
        let first = item("first", 1, "Zeta", 5, AdviceKind::After);
        let second = item("second", 2, "Alpha", 0, AdviceKind::Before);
        assert_eq!(cmp.compare(&first, &second), Ordering::Less);
        assert_eq!(cmp.compare(&second, &first), Ordering::Greater);

        let sorted = sort_by_precedence(vec![second, first]);
        assert_eq!(labels(&sorted), ["first", "second"]);
    }

    #[test]
    fn test_same_aspect_before_advice_earlier_wins() {
        let a = item("a", 10, "Logging", 0, AdviceKind::Before);
        let b = item("b", 10, "Logging", 1, AdviceKind::Before);
        assert_eq!(AspectJPrecedenceComparator.compare(&a, &b), Ordering::Less);
        assert_eq!(labels(&sort_by_precedence(vec![b, a])), ["a", "b"]);
    }

    #[test]
    fn test_same_aspect_after_advice_later_wins() {
        let a = item("a", 10, "Logging", 0, AdviceKind::After);
        let b = item("b", 10, "Logging", 1, AdviceKind::AfterReturning);
        assert_eq!(AspectJPrecedenceComparator.compare(&a, &b), Ordering::Greater);
        assert_eq!(labels(&sort_by_precedence(vec![a, b])), ["b", "a"]);
    }

    #[test]
    fn test_before_and_after_in_same_aspect() {
        let before = item("before", 10, "Logging", 0, AdviceKind::Before);
        let after = item("after", 10, "Logging", 1, AdviceKind::After);
        assert_eq!(
            AspectJPrecedenceComparator.compare(&after, &before),
            Ordering::Less
        );
        assert_eq!(labels(&sort_by_precedence(vec![before, after])), ["after", "before"]);
    }

    #[test]
    fn test_no_opinion_cases() {
        let cmp = AspectJPrecedenceComparator;
        let a = item("a", 10, "Logging", 0, AdviceKind::Before);
        let other_aspect = item("b", 10, "Security", 1, AdviceKind::Before);
        let same_position = item("c", 10, "Logging", 0, AdviceKind::After);
        let no_info = Item {
            label: "d",
            order: 10,
            info: None,
        };
        assert_eq!(cmp.compare(&a, &other_aspect), Ordering::Equal);
        assert_eq!(cmp.compare(&a, &same_position), Ordering::Equal);
        assert_eq!(cmp.compare(&a, &no_info), Ordering::Equal);
    }

    #[test]
    fn test_partial_order_sort_keeps_unrelated_items_stable() {
        let security = item("security", 10, "Security", 0, AdviceKind::Before);
        let log_before = item("log-before", 10, "Logging", 0, AdviceKind::Before);
        let log_after = item("log-after", 10, "Logging", 1, AdviceKind::After);
        let tx = item("tx", 1, "Tx", 0, AdviceKind::Around);

        let sorted = sort_by_precedence(vec![security, log_before, log_after, tx]);
        assert_eq!(labels(&sorted), ["tx", "security", "log-after", "log-before"]);
    }
}
