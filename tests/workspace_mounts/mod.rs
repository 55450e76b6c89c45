mod commit_test;
mod queue_test;
mod routing_test;
