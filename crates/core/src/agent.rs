//! Agent autonomy settings.

use serde::{Deserialize, Serialize};

use crate::tool::Tool;

/// How much freedom the agent has to act.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Can only read, never mutate
    ReadOnly,
    /// Refuses tools that would need the user's confirmation (default)
    #[default]
    Supervised,
    /// Execute everything
    Full,
}

impl AutonomyLevel {
    /// Whether a tool may run without asking.
    pub fn permits(self, tool: &dyn Tool) -> bool {
        match self {
            Self::ReadOnly => !tool.is_mutating(),
            Self::Supervised => !tool.requires_confirmation(),
            Self::Full => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tool::{ToolInvocation, ToolKind, ToolResult};
    use async_trait::async_trait;

    struct Fixed {
        kind: ToolKind,
        confirm: bool,
    }

    #[async_trait]
    impl Tool for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn kind(&self) -> ToolKind {
            self.kind
        }
        fn requires_confirmation(&self) -> bool {
            self.confirm
        }
        async fn execute(&self, _: ToolInvocation) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success(""))
        }
    }

    #[test]
    fn autonomy_defaults_to_supervised() {
        assert_eq!(AutonomyLevel::default(), AutonomyLevel::Supervised);
    }

    #[test]
    fn read_only_blocks_mutation() {
        let reader = Fixed { kind: ToolKind::Read, confirm: false };
        let writer = Fixed { kind: ToolKind::Write, confirm: false };
        assert!(AutonomyLevel::ReadOnly.permits(&reader));
        assert!(!AutonomyLevel::ReadOnly.permits(&writer));
    }

    #[test]
    fn supervised_blocks_confirmation() {
        let quiet_writer = Fixed { kind: ToolKind::Write, confirm: false };
        let loud_reader = Fixed { kind: ToolKind::Read, confirm: true };
        assert!(AutonomyLevel::Supervised.permits(&quiet_writer));
        assert!(!AutonomyLevel::Supervised.permits(&loud_reader));
        assert!(AutonomyLevel::Full.permits(&loud_reader));
    }
}
