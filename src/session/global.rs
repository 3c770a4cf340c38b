use moonbridge_runtime::{IntoArgs, Result, Table, Variant};

use super::Session;

/// Named-global proxy; every operation forwards to the session
#[derive(Debug, Clone)]
pub struct Global<'s> {
    session: &'s Session,
    name: String,
}

impl<'s> Global<'s> {
    pub(super) fn new(session: &'s Session, name: String) -> Self {
        Self { session, name }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Result<Variant> {
        self.session.get_global(&self.name)
    }

    pub fn set(&self, value: impl Into<Variant>) -> Result<()> {
        self.session.set_global(&self.name, value)
    }

    pub fn call(&self, args: impl IntoArgs) -> Result<Variant> {
        self.session.call(&self.name, args)
    }

    pub fn table(&self) -> Result<Option<Table>> {
        self.session.get_table(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_forwards() {
        let session = Session::new().unwrap();
        let counter = session.global("counter");
        counter.set(1).unwrap();
        session.eval("counter = counter + 1").unwrap();
        assert_eq!(counter.get().unwrap(), Variant::Float(2.0));
        assert_eq!(counter.name(), "counter");

        session.eval("function double(x) return x * 2 end").unwrap();
        assert_eq!(session.global("double").call((21,)).unwrap(), Variant::Float(42.0));
    }
}
