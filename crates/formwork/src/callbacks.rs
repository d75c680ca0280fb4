//! Before/around/after hook chains.
//!
//! Used for form `save` callbacks and for the reference model's own save
//! callbacks. A chain runs as:
//!
//! ```text
//! before*  ->  around[0] { around[1] { ... body ... } }  ->  after*
//! ```
//!
//! An around hook receives the rest of the chain as a `yield` function. If
//! it returns without calling it, the body and the after hooks are skipped
//! and [`Callbacks::run`] reports the run as halted.

use std::rc::Rc;

type Hook<T, E> = Rc<dyn Fn(&mut T) -> Result<(), E>>;

/// The continuation handed to an around hook.
pub type Yield<'a, T, E> = dyn FnMut(&mut T) -> Result<(), E> + 'a;

type AroundHook<T, E> = Rc<dyn Fn(&mut T, &mut Yield<'_, T, E>) -> Result<(), E>>;

pub struct Callbacks<T, E> {
    before: Vec<Hook<T, E>>,
    around: Vec<AroundHook<T, E>>,
    after: Vec<Hook<T, E>>,
}

impl<T, E> Default for Callbacks<T, E> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            around: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl<T, E> Clone for Callbacks<T, E> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            around: self.around.clone(),
            after: self.after.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Callbacks<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("before", &self.before.len())
            .field("around", &self.around.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl<T, E> Callbacks<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(&mut self, hook: F)
    where
        F: Fn(&mut T) -> Result<(), E> + 'static,
    {
        self.before.push(Rc::new(hook));
    }

    pub fn around<F>(&mut self, hook: F)
    where
        F: Fn(&mut T, &mut Yield<'_, T, E>) -> Result<(), E> + 'static,
    {
        self.around.push(Rc::new(hook));
    }

    pub fn after<F>(&mut self, hook: F)
    where
        F: Fn(&mut T) -> Result<(), E> + 'static,
    {
        self.after.push(Rc::new(hook));
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.around.is_empty() && self.after.is_empty()
    }

    /// Run the chain around `body`. Returns `Ok(false)` when an around hook
    /// halted the chain.
    pub fn run<F>(&self, target: &mut T, body: F) -> Result<bool, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        for hook in &self.before {
            hook(target)?;
        }

        let mut body = Some(body);
        let mut once = |target: &mut T| match body.take() {
            Some(body) => body(target),
            None => Ok(()),
        };
        if !run_around(&self.around, target, &mut once)? {
            return Ok(false);
        }

        for hook in &self.after {
            hook(target)?;
        }
        Ok(true)
    }
}

fn run_around<T, E>(
    chain: &[AroundHook<T, E>],
    target: &mut T,
    body: &mut Yield<'_, T, E>,
) -> Result<bool, E> {
    let Some((outer, rest)) = chain.split_first() else {
        body(target)?;
        return Ok(true);
    };

    let mut reached = false;
    outer(target, &mut |target: &mut T| {
        reached = run_around(rest, target, body)?;
        Ok(())
    })?;
    Ok(reached)
}
