mod runtime_loop;
mod support;
