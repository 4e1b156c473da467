use futures::future::{FutureExt, LocalBoxFuture};
use std::future::Future;

use crate::signal::SimObject;
use crate::TbResult;

pub type TestFn = Box<dyn Fn(SimObject) -> LocalBoxFuture<'static, TbResult>>;

pub struct Test {
    pub name: String,
    pub generator: TestFn,
}

impl Test {
    pub fn new<F, Fut>(name: &str, generator: F) -> Self
    where
        F: Fn(SimObject) -> Fut + 'static,
        Fut: Future<Output = TbResult> + 'static,
    {
        Test {
            name: name.to_string(),
            generator: Box::new(move |dut| generator(dut).boxed_local()),
        }
    }
}

/// Ordered list of tests run one after another in one simulation.
#[derive(Default)]
pub struct Tests(Vec<Test>);

impl Tests {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn add<F, Fut>(mut self, name: &str, generator: F) -> Self
    where
        F: Fn(SimObject) -> Fut + 'static,
        Fut: Future<Output = TbResult> + 'static,
    {
        self.push(Test::new(name, generator));
        self
    }
    pub fn push(&mut self, test: Test) {
        self.0.push(test);
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.0.iter()
    }
}

impl IntoIterator for Tests {
    type Item = Test;
    type IntoIter = std::vec::IntoIter<Test>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
