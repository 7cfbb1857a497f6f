//! Centralized prompts for the planning, execution and replanning calls.
//! Each prompt asks for a small JSON shape that the caller decodes.
use crate::types::StepRecord;

pub fn planner_system_prompt(tool_catalog: &str) -> String {
    format!(
        r#"You are an expert in deciphering questions and creating step-by-step plans.
Based on the given objective, create a simple plan. Each step must be a distinct task that, when executed, leads to the correct answer. Avoid superfluous steps.

Available tools:
{}

Guidelines for choosing the tool of each step:
- Portfolio questions ("What's my portfolio?", "Last trade on Nvidia?"): portfolio_retriever.
- Current price of a stock: price_checker. When several stocks must be priced, use one step per stock.
- Equity or market analysis ("Will Nvidia rise?", "Is Intel a buy?"): stock_analyser.
- General or non-financial questions ("Hi", "Who are you?"): normal_responder.
Each step must name exactly one tool. Never combine two tools in one step.
Each step must carry all the information it needs; do not rely on shared memory.
The result of the final step should be the final answer.

Example objective: Should I sell my Nvidia stocks now?
Example plan:
{{"steps":[
 "Check the number of Nvidia shares and average purchase price in the portfolio using the portfolio_retriever tool",
 "Check the current price of Nvidia stock using the price_checker tool",
 "Analyse how Nvidia stock is doing in today's market and whether to sell or hold using the stock_analyser tool",
 "Based on the current and purchase price, calculate the profit or loss of selling today",
 "Combine the information from the prior steps into a recommendation"
]}}

Answer with JSON only, shaped {{"steps": ["...", "..."]}}."#,
        tool_catalog
    )
}

pub fn planner_user_prompt(objective: &str) -> String {
    format!("Objective: {}", objective)
}

pub fn executor_system_prompt(persona: &str, user_profile: &str, tool_catalog: &str) -> String {
    format!(
        r#"{}
You are NOT an LLM or AI chatbot. Execute the task you are assigned and report the result clearly and concisely.
{}
If you are asked for guidance or a recommendation, you MUST give comprehensive advice based on the information gathered.

Tools:
{}

Reply with JSON only, one of:
{{"tool": "<tool name>", "input": "<instruction for the tool>"}}
{{"answer": "<result of the task>"}}"#,
        persona.trim(),
        user_profile.trim(),
        tool_catalog
    )
}

/// Render steps as a numbered list starting at `first_number`
pub fn numbered(steps: &[String], first_number: usize) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", first_number + i, step))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history(history: &[StepRecord]) -> String {
    history
        .iter()
        .map(|record| format!("{}: {}", record.step, record.result))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One tool call already made while executing the current step
pub struct ToolCallView<'a> {
    pub tool: &'a str,
    pub input: &'a str,
    pub output: &'a str,
}

pub fn executor_step_prompt(
    plan: &str,
    step_number: usize,
    step: &str,
    history: &[StepRecord],
    calls: &[ToolCallView<'_>],
    remaining_calls: usize,
) -> String {
    let mut prompt = format!(
        "For the following plan:\n{}\n\nYou are tasked with executing step {}, {}.\n",
        plan, step_number, step
    );

    if !history.is_empty() {
        prompt.push_str("\nResults of earlier steps:\n");
        prompt.push_str(&format_history(history));
        prompt.push('\n');
    }

    if !calls.is_empty() {
        prompt.push_str("\nTool calls made for this step:\n");
        for (i, call) in calls.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. {}(\"{}\") -> {}\n",
                i + 1,
                call.tool,
                call.input,
                call.output
            ));
        }
    }

    if remaining_calls == 0 {
        prompt.push_str("\nNo tool calls remain. Reply with {\"answer\": ...} now.\n");
    } else {
        prompt.push_str(&format!(
            "\nYou may make up to {} more tool call(s). Do not repeat a call that already succeeded.\n",
            remaining_calls
        ));
    }

    prompt
}

pub fn replanner_system_prompt() -> &'static str {
    r#"You maintain a step-by-step plan for an objective. Each step is a distinct task and the final step's result is the final answer.

If the completed steps already answer the objective, reply with {"response": "<final answer to the user>"}.
Otherwise reply with {"plan": {"steps": ["..."]}} listing ONLY the steps that still NEED to be done. Incorporate data from the completed steps and do not fetch information again. Never repeat completed steps.
Reply with exactly one of the two shapes, as JSON only."#
}

pub fn replanner_user_prompt(
    objective: &str,
    original_plan: &[String],
    history: &[StepRecord],
    tool_outputs: &[String],
) -> String {
    format!(
        "Your objective:\n{}\n\nYour original plan:\n{}\n\nHere is the information gathered from the previous steps:\n{}\n\nHere are the direct responses from the tools:\n{}\n\nUpdate the plan or respond.",
        objective,
        numbered(original_plan, 1),
        format_history(history),
        tool_outputs.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered() {
        let steps = vec!["check price".to_string(), "combine".to_string()];
        assert_eq!(numbered(&steps, 3), "3. check price\n4. combine");
        assert_eq!(numbered(&[], 1), "");
    }

    #[test]
    fn test_step_prompt_mentions_step_number_and_budget() {
        let prompt = executor_step_prompt("2. Check AAPL", 2, "Check AAPL", &[], &[], 5);
        assert!(prompt.contains("executing step 2, Check AAPL."));
        assert!(prompt.contains("up to 5 more tool call(s)"));

        let calls = [ToolCallView {
            tool: "price_checker",
            input: "AAPL",
            output: "AAPL: Current Price: $1.00",
        }];
        let prompt = executor_step_prompt("2. Check AAPL", 2, "Check AAPL", &[], &calls, 0);
        assert!(prompt.contains("price_checker(\"AAPL\") -> AAPL: Current Price: $1.00"));
        assert!(prompt.contains("No tool calls remain"));
    }

    #[test]
    fn test_replanner_prompt_sections() {
        let history = vec![StepRecord {
            step: "Check AAPL".into(),
            result: "AAPL is $1".into(),
        }];
        let prompt = replanner_user_prompt(
            "price of AAPL",
            &["Check AAPL".to_string()],
            &history,
            &["raw AAPL".to_string()],
        );
        assert!(prompt.contains("Your objective:\nprice of AAPL"));
        assert!(prompt.contains("1. Check AAPL"));
        assert!(prompt.contains("Check AAPL: AAPL is $1"));
        assert!(prompt.contains("direct responses from the tools:\nraw AAPL"));
    }
}
