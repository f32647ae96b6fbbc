//! Completion Action Scripts
//!
//! Lua-backed `ActionRunner` for the scripted effects a quest fires on
//! completion. Each expression runs in a fresh sandboxed VM with the
//! actor and target exposed as globals; script failures are logged and
//! swallowed, never propagated into the completion transaction.

use mlua::{Lua, Value};
use tracing::{debug, warn};

use crate::ports::ActionRunner;

pub struct LuaActionRunner;

impl LuaActionRunner {
    pub fn new() -> Self {
        Self
    }

    fn eval(&self, expr: &str, owner: &str, target: Option<&str>) -> mlua::Result<()> {
        let lua = Lua::new();
        let globals = lua.globals();

        // Sandbox: no filesystem or process access from quest actions
        globals.set("os", Value::Nil)?;
        globals.set("io", Value::Nil)?;
        globals.set("loadfile", Value::Nil)?;
        globals.set("dofile", Value::Nil)?;
        globals.set("require", Value::Nil)?;

        globals.set("actor", owner)?;
        globals.set("target", target.unwrap_or(""))?;

        lua.load(expr).set_name("quest_action").exec()
    }
}

impl Default for LuaActionRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRunner for LuaActionRunner {
    fn run(&self, expr: &str, owner: &str, target: Option<&str>) {
        match self.eval(expr, owner, target) {
            Ok(()) => debug!("Completion action ran for {}", owner),
            Err(e) => warn!("Completion action failed for {}: {}", owner, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_sees_actor_global() {
        let runner = LuaActionRunner::new();
        let result = runner.eval("assert(actor == 'alice')", "alice", None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_target_is_empty_string() {
        let runner = LuaActionRunner::new();
        let result = runner.eval("assert(target == '')", "alice", None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_sandbox_blocks_os_and_io() {
        let runner = LuaActionRunner::new();
        assert!(runner.eval("assert(os == nil and io == nil)", "alice", None).is_ok());
    }

    #[test]
    fn test_script_errors_are_swallowed_by_run() {
        let runner = LuaActionRunner::new();
        // Must not panic or propagate
        runner.run("error('boom')", "alice", None);
        runner.run("this is not lua", "alice", None);
    }
}
