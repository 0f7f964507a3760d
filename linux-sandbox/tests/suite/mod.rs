mod landlock;
