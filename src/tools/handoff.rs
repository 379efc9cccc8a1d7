//! Router handoff tools

use crate::agents::Specialist;
use crate::llm::ToolDefinition;
use serde_json::json;

/// Definition of the router tool that transfers the conversation to `target`
pub fn handoff_definition(target: Specialist) -> ToolDefinition {
    let description = match target {
        Specialist::Appointment => {
            "Transfer the conversation to the appointment specialist. Use for anything about \
             appointments (listing, booking, rescheduling, confirming, cancelling) and general \
             questions about visits or treatment."
        }
        Specialist::Prescription => {
            "Transfer the conversation to the prescription specialist. Use for anything about \
             prescriptions (listing, refilling) and general questions about medication, \
             conditions or treatment."
        }
    };

    ToolDefinition {
        name: target.handoff_tool().to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
    }
}
