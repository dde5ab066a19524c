use std::io;
use std::sync::Arc;

use ioc_kernel::prelude::*;

#[derive(Debug)]
pub struct Infallible;

#[injectable]
impl Infallible {
    #[inject]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
pub struct Fallible;

#[injectable]
impl Fallible {
    #[inject]
    pub fn new() -> Result<Self, io::Error> {
        Ok(Self)
    }
}

#[derive(Debug)]
pub struct FullPath;

#[injectable]
impl FullPath {
    #[inject]
    pub fn new() -> std::result::Result<Self, String> {
        Ok(Self)
    }
}

#[derive(Debug)]
pub struct Alias;

#[injectable(thread)]
impl Alias {
    #[inject]
    pub fn new(_dependency: Arc<Infallible>) -> io::Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Default)]
pub struct Hooks {
    value: Option<u8>,
}

#[injectable(activation_scope)]
impl Hooks {
    #[constructor]
    pub fn new() -> Self {
        Self::default()
    }

    #[inject]
    pub fn set_value(&mut self, value: Option<u8>) -> Result<(), io::Error> {
        self.value = value;
        Ok(())
    }

    #[start]
    fn start(&self) -> () {}

    #[stop]
    fn stop(&self) -> io::Result<()> {
        Ok(())
    }
}

fn main() {
    assert!(Infallible::describe().is_constructible());
    assert!(Fallible::describe().is_constructible());
    assert!(FullPath::describe().is_constructible());
    assert!(Alias::describe().lifecycle().is_some());
    assert_eq!(Hooks::describe().members().len(), 1);
}
