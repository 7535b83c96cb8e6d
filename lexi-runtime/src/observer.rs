//! # Observer 模块
//!
//! 显式的快照订阅接口。组件在每次状态变化后发布快照，
//! 视图层通过订阅接收，或者直接调用组件的 `state()` 拉取。

/// 订阅 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<S> = Box<dyn FnMut(&S)>;

/// 订阅者列表
pub struct Subscribers<S> {
    entries: Vec<(SubscriptionId, Callback<S>)>,
    next_id: u64,
}

impl<S> Default for Subscribers<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for Subscribers<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl<S> Subscribers<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// 注册回调
    pub fn subscribe(&mut self, callback: impl FnMut(&S) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// 注销回调，返回是否存在
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// 按注册顺序通知所有订阅者
    pub fn publish(&mut self, snapshot: &S) {
        for (_, callback) in &mut self.entries {
            callback(snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut subs = Subscribers::new();

        let l1 = log.clone();
        subs.subscribe(move |v: &u32| l1.borrow_mut().push(("a", *v)));
        let l2 = log.clone();
        subs.subscribe(move |v: &u32| l2.borrow_mut().push(("b", *v)));

        subs.publish(&7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut subs = Subscribers::new();

        let c = count.clone();
        let id = subs.subscribe(move |_: &()| *c.borrow_mut() += 1);
        subs.publish(&());
        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        subs.publish(&());

        assert_eq!(*count.borrow(), 1);
        assert!(subs.is_empty());
    }
}
