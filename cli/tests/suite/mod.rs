mod tool_calls;
