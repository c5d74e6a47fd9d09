type DisposeAction<C> = Box<dyn FnOnce(&mut C)>;

/// 按 LIFO 顺序执行的销毁动作栈
///
/// 每成功创建一个资源，就立即 push 它的销毁动作；
/// 初始化中途失败时，只会销毁已经创建的部分
///
/// `C` 是执行销毁动作时需要的上下文，例如 device 和资源池。
/// `dispose_all` 期间栈被可变借用，销毁动作无法再向栈中 push
pub struct DisposeStack<C: ?Sized> {
    actions: Vec<(String, DisposeAction<C>)>,
}

impl<C: ?Sized> Default for DisposeStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> DisposeStack<C> {
    pub fn new() -> Self {
        Self { actions: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>, action: impl FnOnce(&mut C) + 'static) {
        self.actions.push((label.into(), Box::new(action)));
    }

    /// 逆序执行所有的销毁动作，执行完毕后栈为空
    pub fn dispose_all(&mut self, ctx: &mut C) {
        log::info!("dispose {} actions", self.actions.len());
        while let Some((label, action)) = self.actions.pop() {
            log::debug!("dispose: {}", label);
            action(ctx);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 按照执行顺序排列的标签
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().rev().map(|(label, _)| label.as_str())
    }
}

impl<C: ?Sized> Drop for DisposeStack<C> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::error!("DisposeStack dropped with {} pending actions: {:?}", self.actions.len(), self.labels().collect::<Vec<_>>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_order_is_reversed() {
        let mut stack = DisposeStack::<Vec<&'static str>>::new();
        stack.push("A", |log| log.push("A"));
        stack.push("B", |log| log.push("B"));
        stack.push("C", |log| log.push("C"));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.labels().collect::<Vec<_>>(), vec!["C", "B", "A"]);

        let mut log = Vec::new();
        stack.dispose_all(&mut log);
        assert_eq!(log, vec!["C", "B", "A"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_partial_init_only_disposes_created() {
        fn init(stack: &mut DisposeStack<Vec<u32>>, fail_at: u32) -> Result<(), u32> {
            for step in 0..4 {
                if step == fail_at {
                    return Err(step);
                }
                stack.push(format!("step {step}"), move |log| log.push(step));
            }
            Ok(())
        }

        let mut stack = DisposeStack::new();
        assert_eq!(init(&mut stack, 2), Err(2));

        let mut log = Vec::new();
        stack.dispose_all(&mut log);
        assert_eq!(log, vec![1, 0]);
    }

    #[test]
    fn test_dispose_all_twice() {
        let mut stack = DisposeStack::<u32>::new();
        stack.push("inc", |count| *count += 1);

        let mut count = 0;
        stack.dispose_all(&mut count);
        stack.dispose_all(&mut count);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_captured_values_are_moved() {
        let mut stack = DisposeStack::<Vec<String>>::new();
        let name = String::from("swapchain");
        stack.push("swapchain", move |log| log.push(name));

        let mut log = Vec::new();
        stack.dispose_all(&mut log);
        assert_eq!(log, vec!["swapchain".to_string()]);
    }
}
