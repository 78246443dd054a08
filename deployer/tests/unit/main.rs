mod test_domain;
mod test_framework;
mod test_fsm;
mod test_layout;
