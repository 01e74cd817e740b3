mod fixtures;
mod test_collector;
mod test_fsm;
mod test_pipeline;
mod test_record;
mod test_render;
mod test_validate;
